use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use super::{ApiResponse, ApiResult};
use crate::{
    appstate::AppState,
    auth::{AdminRole, SessionInfo},
    connection_management::{
        admit_connection, finalize_connection, force_disconnect_account, ConnectionRequest,
    },
    db::{Id, LiveSessionInfo, Session, User},
    error::WebError,
};

#[derive(Deserialize)]
pub struct HistoryParams {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

fn default_history_limit() -> i64 {
    50
}

#[derive(Deserialize, Serialize)]
pub struct DisconnectData {
    pub uploaded: i64,
    pub downloaded: i64,
}

/// Register a new connection, optionally letting the selector pick the relay.
pub(crate) async fn connect(
    State(appstate): State<AppState>,
    session: SessionInfo,
    Json(request): Json<ConnectionRequest>,
) -> ApiResult {
    let connection = admit_connection(&appstate.pool, session.user.id, &request).await?;
    Ok(ApiResponse::new(json!(connection), StatusCode::CREATED))
}

/// End a connection and record the transfer totals reported by the client.
pub(crate) async fn disconnect(
    State(appstate): State<AppState>,
    session: SessionInfo,
    Path(id): Path<Id>,
    Json(data): Json<DisconnectData>,
) -> ApiResult {
    if data.uploaded < 0 || data.downloaded < 0 {
        return Err(WebError::BadRequest(
            "Transfer counters cannot be negative".into(),
        ));
    }
    let connection = finalize_connection(
        &appstate.pool,
        session.user.id,
        id,
        data.uploaded,
        data.downloaded,
    )
    .await?;
    Ok(ApiResponse::new(json!(connection), StatusCode::OK))
}

pub(crate) async fn connection_history(
    State(appstate): State<AppState>,
    session: SessionInfo,
    Query(params): Query<HistoryParams>,
) -> ApiResult {
    let limit = params.limit.clamp(1, 100);
    let connections = Session::all_for_user(&appstate.pool, session.user.id, limit).await?;
    Ok(ApiResponse::new(json!(connections), StatusCode::OK))
}

/// All currently connected sessions across the fleet.
pub(crate) async fn live_connections(
    State(appstate): State<AppState>,
    _admin: AdminRole,
) -> ApiResult {
    let connections = LiveSessionInfo::all_connected(&appstate.pool).await?;
    Ok(ApiResponse::new(json!(connections), StatusCode::OK))
}

/// Drop every live connection of one account.
pub(crate) async fn force_disconnect_user(
    State(appstate): State<AppState>,
    _admin: AdminRole,
    Path(username): Path<String>,
) -> ApiResult {
    let user = User::find_by_username(&appstate.pool, &username)
        .await?
        .ok_or_else(|| WebError::ObjectNotFound(format!("User {username} not found")))?;
    let disconnected = force_disconnect_account(&appstate.pool, user.id).await?;
    Ok(ApiResponse::new(
        json!({ "disconnected": disconnected }),
        StatusCode::OK,
    ))
}
