use std::{
    env,
    time::{Duration, SystemTime},
};

use jsonwebtoken::{
    decode, encode, errors::Error as JWTError, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

pub static JWT_ISSUER: &str = "TunnelHub";
pub static AUTH_SECRET_ENV: &str = "TUNNELHUB_AUTH_SECRET";
pub static REFRESH_SECRET_ENV: &str = "TUNNELHUB_REFRESH_SECRET";

#[derive(Clone, Copy, Default)]
pub enum ClaimsType {
    #[default]
    Auth,
    Refresh,
}

/// Standard claims: https://www.iana.org/assignments/jwt/jwt.xhtml
#[derive(Deserialize, Serialize)]
pub struct Claims {
    #[serde(skip_serializing, skip_deserializing)]
    secret: String,
    // issuer
    pub iss: String,
    // subject
    pub sub: String,
    // client identifier
    pub client_id: String,
    // expiration time
    pub exp: u64,
    // not before
    pub nbf: u64,
}

impl Claims {
    #[must_use]
    pub fn new(claims_type: ClaimsType, sub: String, client_id: String, duration: u64) -> Self {
        let now = SystemTime::now();
        let exp = now
            .checked_add(Duration::from_secs(duration))
            .expect("valid time")
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("valid timestamp")
            .as_secs();
        let nbf = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("valid timestamp")
            .as_secs();
        Self {
            secret: Self::get_secret(claims_type),
            iss: JWT_ISSUER.to_string(),
            sub,
            client_id,
            exp,
            nbf,
        }
    }

    fn get_secret(claims_type: ClaimsType) -> String {
        let env_var = match claims_type {
            ClaimsType::Auth => AUTH_SECRET_ENV,
            ClaimsType::Refresh => REFRESH_SECRET_ENV,
        };
        env::var(env_var).unwrap_or_default()
    }

    /// Convert claims to JWT.
    pub fn to_jwt(&self) -> Result<String, JWTError> {
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
    }

    /// Verify JWT and, if successful, convert it to claims.
    pub fn from_jwt(claims_type: ClaimsType, token: &str) -> Result<Self, JWTError> {
        let secret = Self::get_secret(claims_type);
        let mut validation = Validation::default();
        validation.validate_nbf = true;
        validation.set_issuer(&[JWT_ISSUER]);
        validation.set_required_spec_claims(&["iss", "sub", "exp", "nbf"]);
        decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_token_round_trip() {
        let claims = Claims::new(
            ClaimsType::Auth,
            "ron".into(),
            "device-1".into(),
            Duration::from_secs(60).as_secs(),
        );
        let token = claims.to_jwt().unwrap();
        let decoded = Claims::from_jwt(ClaimsType::Auth, &token).unwrap();
        assert_eq!(decoded.sub, "ron");
        assert_eq!(decoded.client_id, "device-1");
        assert_eq!(decoded.iss, JWT_ISSUER);
    }

    #[test]
    fn test_invalid_token_rejected() {
        assert!(Claims::from_jwt(ClaimsType::Auth, "not-a-token").is_err());
    }
}
