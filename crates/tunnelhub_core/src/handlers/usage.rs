use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{Days, Utc};
use serde_json::json;

use super::{ApiResponse, ApiResult};
use crate::{
    appstate::AppState,
    auth::{AdminRole, SessionInfo},
    db::{DailyUsage, Id, User},
    error::WebError,
};

#[derive(Deserialize)]
pub struct UsageParams {
    #[serde(default = "default_days")]
    pub days: u64,
}

fn default_days() -> u64 {
    30
}

fn window_start(days: u64) -> chrono::NaiveDate {
    let days = days.clamp(1, 365);
    Utc::now()
        .date_naive()
        .checked_sub_days(Days::new(days))
        .unwrap_or_else(|| Utc::now().date_naive())
}

/// Transfer totals over a trailing day window, summed across protocols.
pub(crate) async fn usage_summary(
    State(appstate): State<AppState>,
    session: SessionInfo,
    Query(params): Query<UsageParams>,
) -> ApiResult {
    let start = window_start(params.days);
    let end = Utc::now().date_naive();
    let summary =
        DailyUsage::summary_for_user(&appstate.pool, session.user.id, start, end).await?;
    Ok(ApiResponse::new(json!(summary), StatusCode::OK))
}

/// Per-day, per-protocol breakdown for the requesting account.
pub(crate) async fn daily_usage(
    State(appstate): State<AppState>,
    session: SessionInfo,
    Query(params): Query<UsageParams>,
) -> ApiResult {
    let start = window_start(params.days);
    let rows = DailyUsage::all_for_user_since(&appstate.pool, session.user.id, start).await?;
    Ok(ApiResponse::new(json!(rows), StatusCode::OK))
}

/// Data allowance status for the requesting account.
pub(crate) async fn quota_status(session: SessionInfo) -> ApiResult {
    let user = &session.user;
    Ok(ApiResponse::new(
        json!({
            "has_limit": user.data_limit_mb.is_some(),
            "limit_mb": user.data_limit_mb,
            "used_mb": user.used_mb(),
            "remaining_mb": user.remaining_quota_mb(),
            "percentage_used": user.used_percent(),
        }),
        StatusCode::OK,
    ))
}

/// Daily usage rows of an arbitrary account, for the admin panel.
pub(crate) async fn user_daily_usage(
    State(appstate): State<AppState>,
    _admin: AdminRole,
    Path(username): Path<String>,
    Query(params): Query<UsageParams>,
) -> ApiResult {
    let user = find_user(&appstate, &username).await?;
    let start = window_start(params.days);
    let rows = DailyUsage::all_for_user_since(&appstate.pool, user.id, start).await?;
    Ok(ApiResponse::new(json!(rows), StatusCode::OK))
}

async fn find_user(appstate: &AppState, username: &str) -> Result<User<Id>, WebError> {
    User::find_by_username(&appstate.pool, username)
        .await?
        .ok_or_else(|| WebError::ObjectNotFound(format!("User {username} not found")))
}
