use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;
use tunnelhub_common::{
    auth::claims::{Claims, ClaimsType},
    config::server_config,
};

use super::{ApiResponse, ApiResult};
use crate::{
    appstate::AppState,
    auth::SessionInfo,
    db::{Id, User},
    error::WebError,
};

#[derive(Deserialize, Serialize)]
pub struct Auth {
    pub username: String,
    pub password: String,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
}

impl Auth {
    #[must_use]
    pub fn new<S: Into<String>>(username: S, password: S) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            device_id: None,
            device_name: None,
        }
    }
}

#[derive(Deserialize, Serialize)]
pub struct Register {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
}

#[derive(Deserialize, Serialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize, Serialize)]
pub struct SelfUpdate {
    pub email: Option<String>,
    pub password: Option<String>,
}

fn issue_tokens(user: &User<Id>) -> Result<serde_json::Value, WebError> {
    let config = server_config();
    let client_id = user.device_id.clone().unwrap_or_default();
    let access_token = Claims::new(
        ClaimsType::Auth,
        user.username.clone(),
        client_id.clone(),
        config.auth_token_timeout.as_secs(),
    )
    .to_jwt()
    .map_err(|err| WebError::Authorization(err.to_string()))?;
    let refresh_token = Claims::new(
        ClaimsType::Refresh,
        user.username.clone(),
        client_id,
        config.refresh_token_timeout.as_secs(),
    )
    .to_jwt()
    .map_err(|err| WebError::Authorization(err.to_string()))?;
    Ok(json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "token_type": "bearer",
        "expires_in": config.auth_token_timeout.as_secs(),
    }))
}

pub(crate) async fn register(
    State(appstate): State<AppState>,
    Json(data): Json<Register>,
) -> ApiResult {
    debug!("Registering user {}", data.username);
    if User::find_by_username(&appstate.pool, &data.username)
        .await?
        .is_some()
    {
        return Err(WebError::BadRequest("Username already registered".into()));
    }
    if let Some(email) = &data.email {
        if User::find_by_email(&appstate.pool, email).await?.is_some() {
            return Err(WebError::BadRequest("Email already registered".into()));
        }
    }

    let user = User::new(data.username, Some(&data.password), data.email)
        .save(&appstate.pool)
        .await?;
    info!("Registered user {}", user.username);

    let tokens = issue_tokens(&user)?;
    Ok(ApiResponse::new(tokens, StatusCode::CREATED))
}

pub(crate) async fn authenticate(
    State(appstate): State<AppState>,
    Json(data): Json<Auth>,
) -> ApiResult {
    debug!("Authenticating user {}", data.username);
    let mut user = User::find_by_username(&appstate.pool, &data.username)
        .await?
        .ok_or_else(|| WebError::Authorization("Invalid username or password".into()))?;
    if user.verify_password(&data.password).is_err() {
        return Err(WebError::Authorization("Invalid username or password".into()));
    }
    if !user.is_active {
        return Err(WebError::Forbidden("Account is disabled".into()));
    }
    if !user.check_device_lock(data.device_id.as_deref()) {
        return Err(WebError::Forbidden(
            "Account is locked to another device".into(),
        ));
    }

    if let Some(device_id) = data.device_id {
        user.bind_device(&appstate.pool, device_id, data.device_name)
            .await?;
    }
    user.update_last_login(&appstate.pool).await?;
    info!("Authenticated user {}", user.username);

    let tokens = issue_tokens(&user)?;
    Ok(ApiResponse::new(tokens, StatusCode::OK))
}

pub(crate) async fn refresh_token(
    State(appstate): State<AppState>,
    Json(data): Json<RefreshRequest>,
) -> ApiResult {
    let claims = Claims::from_jwt(ClaimsType::Refresh, &data.refresh_token)
        .map_err(|_| WebError::Authorization("Invalid refresh token".into()))?;
    let user = User::find_by_username(&appstate.pool, &claims.sub)
        .await?
        .ok_or_else(|| WebError::Authorization("User not found or disabled".into()))?;
    if !user.is_active {
        return Err(WebError::Authorization("User not found or disabled".into()));
    }

    let tokens = issue_tokens(&user)?;
    Ok(ApiResponse::new(tokens, StatusCode::OK))
}

pub(crate) async fn me(session: SessionInfo) -> ApiResult {
    Ok(ApiResponse::new(json!(session.user), StatusCode::OK))
}

/// Self-service profile update; accounts may only change their own email and
/// password, everything else is managed by administrators.
pub(crate) async fn update_profile(
    State(appstate): State<AppState>,
    session: SessionInfo,
    Json(data): Json<SelfUpdate>,
) -> ApiResult {
    let mut user = session.user;
    if let Some(email) = data.email {
        user.email = Some(email);
    }
    if let Some(password) = data.password {
        user.set_password(&password);
    }
    user.save(&appstate.pool).await?;
    info!("User {} updated their profile", user.username);
    Ok(ApiResponse::new(json!(user), StatusCode::OK))
}

pub(crate) async fn logout(session: SessionInfo) -> ApiResult {
    // tokens are stateless, the client discards them
    debug!("User {} logged out", session.user.username);
    Ok(ApiResponse::new(
        json!({ "msg": "Successfully logged out" }),
        StatusCode::OK,
    ))
}
