use axum::{extract::FromRequestParts, http::request::Parts};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tunnelhub_common::auth::claims::{Claims, ClaimsType};

use crate::{
    appstate::AppState,
    db::{Id, User, UserRole},
    error::WebError,
};

// Authenticated requester, resolved from the bearer token on every request.
pub struct SessionInfo {
    pub user: User<Id>,
    pub is_admin: bool,
}

impl FromRequestParts<AppState> for SessionInfo {
    type Rejection = WebError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| WebError::Authorization("Missing authorization header".into()))?;
        let claims = Claims::from_jwt(ClaimsType::Auth, bearer.token())
            .map_err(|_| WebError::Authorization("Invalid token".into()))?;
        let user = User::find_by_username(&state.pool, &claims.sub)
            .await?
            .ok_or_else(|| WebError::Authorization("User not found".into()))?;
        if !user.is_active {
            return Err(WebError::Authorization("Account is disabled".into()));
        }
        let is_admin = user.role == UserRole::Admin;
        Ok(SessionInfo { user, is_admin })
    }
}

pub struct AdminRole {
    pub session: SessionInfo,
}

impl FromRequestParts<AppState> for AdminRole {
    type Rejection = WebError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = SessionInfo::from_request_parts(parts, state).await?;
        if session.is_admin {
            Ok(AdminRole { session })
        } else {
            Err(WebError::Forbidden("access denied".into()))
        }
    }
}
