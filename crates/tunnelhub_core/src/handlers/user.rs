use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use super::{ApiResponse, ApiResult};
use crate::{
    appstate::AppState,
    auth::AdminRole,
    db::{Id, Session, User, UserRole},
    error::WebError,
};

#[derive(Deserialize)]
pub struct UserFilter {
    pub search: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
}

#[derive(Deserialize, Serialize)]
pub struct AddUserData {
    pub username: String,
    pub password: String,
    pub email: Option<String>,
    #[serde(default = "default_role")]
    pub role: UserRole,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_locked: bool,
    #[serde(default = "default_max_devices")]
    pub max_devices: i64,
    pub data_limit_mb: Option<i64>,
}

#[derive(Deserialize, Serialize)]
pub struct ModifyUserData {
    pub password: Option<String>,
    pub email: Option<String>,
    pub role: Option<UserRole>,
    pub is_active: Option<bool>,
    pub is_locked: Option<bool>,
    pub max_devices: Option<i64>,
    // wrap in an outer Option so "null" clears the cap while a missing field
    // leaves it untouched
    pub data_limit_mb: Option<Option<i64>>,
}

fn default_role() -> UserRole {
    UserRole::User
}

fn default_true() -> bool {
    true
}

fn default_max_devices() -> i64 {
    1
}

async fn find_user(appstate: &AppState, username: &str) -> Result<User<Id>, WebError> {
    User::find_by_username(&appstate.pool, username)
        .await?
        .ok_or_else(|| WebError::ObjectNotFound(format!("User {username} not found")))
}

pub(crate) async fn list_users(
    State(appstate): State<AppState>,
    _admin: AdminRole,
    Query(filter): Query<UserFilter>,
) -> ApiResult {
    let users = User::all(&appstate.pool).await?;
    let users: Vec<_> = users
        .into_iter()
        .filter(|user| {
            filter.role.is_none_or(|role| user.role == role)
                && filter.is_active.is_none_or(|active| user.is_active == active)
                && filter.search.as_ref().is_none_or(|needle| {
                    let needle = needle.to_lowercase();
                    user.username.to_lowercase().contains(&needle)
                        || user
                            .email
                            .as_ref()
                            .is_some_and(|email| email.to_lowercase().contains(&needle))
                })
        })
        .collect();
    Ok(ApiResponse::new(json!(users), StatusCode::OK))
}

pub(crate) async fn add_user(
    State(appstate): State<AppState>,
    _admin: AdminRole,
    Json(data): Json<AddUserData>,
) -> ApiResult {
    if User::find_by_username(&appstate.pool, &data.username)
        .await?
        .is_some()
    {
        return Err(WebError::BadRequest("Username already exists".into()));
    }
    if let Some(email) = &data.email {
        if User::find_by_email(&appstate.pool, email).await?.is_some() {
            return Err(WebError::BadRequest("Email already exists".into()));
        }
    }

    let mut user = User::new(data.username, Some(&data.password), data.email);
    user.role = data.role;
    user.is_active = data.is_active;
    user.is_locked = data.is_locked;
    user.max_devices = data.max_devices;
    user.data_limit_mb = data.data_limit_mb;
    let user = user.save(&appstate.pool).await?;
    info!("Created user {}", user.username);
    Ok(ApiResponse::new(json!(user), StatusCode::CREATED))
}

pub(crate) async fn get_user(
    State(appstate): State<AppState>,
    _admin: AdminRole,
    Path(username): Path<String>,
) -> ApiResult {
    let user = find_user(&appstate, &username).await?;
    let current_connections = Session::count_connected_for_user(&appstate.pool, user.id).await?;
    let mut body = json!(user);
    body["current_connections"] = json!(current_connections);
    body["is_online"] = json!(current_connections > 0);
    Ok(ApiResponse::new(body, StatusCode::OK))
}

pub(crate) async fn modify_user(
    State(appstate): State<AppState>,
    _admin: AdminRole,
    Path(username): Path<String>,
    Json(data): Json<ModifyUserData>,
) -> ApiResult {
    let mut user = find_user(&appstate, &username).await?;
    if let Some(password) = data.password {
        user.set_password(&password);
    }
    if let Some(email) = data.email {
        user.email = Some(email);
    }
    if let Some(role) = data.role {
        user.role = role;
    }
    if let Some(is_active) = data.is_active {
        user.is_active = is_active;
    }
    if let Some(is_locked) = data.is_locked {
        user.is_locked = is_locked;
    }
    if let Some(max_devices) = data.max_devices {
        user.max_devices = max_devices;
    }
    if let Some(data_limit_mb) = data.data_limit_mb {
        user.data_limit_mb = data_limit_mb;
    }
    user.save(&appstate.pool).await?;
    info!("Updated user {}", user.username);
    Ok(ApiResponse::new(json!(user), StatusCode::OK))
}

/// Remove an account together with its sessions and usage history.
pub(crate) async fn delete_user(
    State(appstate): State<AppState>,
    admin: AdminRole,
    Path(username): Path<String>,
) -> ApiResult {
    let user = find_user(&appstate, &username).await?;
    if user.role == UserRole::Admin {
        return Err(WebError::BadRequest("Cannot delete admin user".into()));
    }
    info!(
        "Admin {} deleting user {username}",
        admin.session.user.username
    );
    user.delete(&appstate.pool).await?;
    Ok(ApiResponse::new(json!({ "msg": "User deleted" }), StatusCode::OK))
}

/// Pin the account to its currently bound device.
pub(crate) async fn lock_user_device(
    State(appstate): State<AppState>,
    _admin: AdminRole,
    Path(username): Path<String>,
) -> ApiResult {
    let mut user = find_user(&appstate, &username).await?;
    user.lock_device(&appstate.pool).await?;
    info!("Locked user {username} to device {:?}", user.device_id);
    Ok(ApiResponse::new(
        json!({ "msg": "User device locked", "device_id": user.device_id }),
        StatusCode::OK,
    ))
}

pub(crate) async fn unlock_user_device(
    State(appstate): State<AppState>,
    _admin: AdminRole,
    Path(username): Path<String>,
) -> ApiResult {
    let mut user = find_user(&appstate, &username).await?;
    user.unlock_device(&appstate.pool).await?;
    info!("Unlocked user {username}");
    Ok(ApiResponse::new(
        json!({ "msg": "User device unlocked" }),
        StatusCode::OK,
    ))
}
