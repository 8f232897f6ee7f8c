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
    db::{DbPool, Id, Protocol, RelayServer},
    error::WebError,
    server_selection::{list_eligible_servers, select_best_server},
};

#[derive(Deserialize)]
pub struct ServerFilter {
    pub country: Option<String>,
    pub protocol: Option<Protocol>,
}

#[derive(Deserialize, Serialize)]
pub struct ServerData {
    pub name: String,
    pub host: String,
    pub port: i64,
    pub protocol: Protocol,
    pub ssh_port: Option<i64>,
    pub ssl_port: Option<i64>,
    pub udp_port: Option<i64>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub city: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub sni_host: Option<String>,
    pub ssl_payload: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_premium: bool,
    #[serde(default = "default_max_users")]
    pub max_users: i64,
    pub latency_ms: Option<i64>,
    pub bandwidth_mbps: Option<f64>,
}

fn default_true() -> bool {
    true
}

fn default_max_users() -> i64 {
    100
}

impl ServerData {
    fn apply<I>(self, server: &mut RelayServer<I>) {
        server.name = self.name;
        server.host = self.host;
        server.port = self.port;
        server.protocol = self.protocol;
        server.ssh_port = self.ssh_port;
        server.ssl_port = self.ssl_port;
        server.udp_port = self.udp_port;
        server.country = self.country;
        server.country_code = self.country_code;
        server.city = self.city;
        server.username = self.username;
        server.password = self.password;
        server.sni_host = self.sni_host;
        server.ssl_payload = self.ssl_payload;
        server.is_active = self.is_active;
        server.is_premium = self.is_premium;
        server.max_users = self.max_users;
        server.latency_ms = self.latency_ms;
        server.bandwidth_mbps = self.bandwidth_mbps;
    }
}

async fn find_server(pool: &DbPool, id: Id) -> Result<RelayServer<Id>, WebError> {
    RelayServer::find_by_id(pool, id)
        .await?
        .ok_or_else(|| WebError::ObjectNotFound(format!("Relay server {id} not found")))
}

/// Servers the requesting account is allowed to connect to.
pub(crate) async fn list_servers(
    State(appstate): State<AppState>,
    session: SessionInfo,
    Query(filter): Query<ServerFilter>,
) -> ApiResult {
    let servers = list_eligible_servers(
        &appstate.pool,
        &session.user,
        filter.country.as_deref(),
        filter.protocol,
    )
    .await?;
    Ok(ApiResponse::new(json!(servers), StatusCode::OK))
}

/// Pick the best relay for the account by load and latency.
pub(crate) async fn best_server(
    State(appstate): State<AppState>,
    session: SessionInfo,
    Query(filter): Query<ServerFilter>,
) -> ApiResult {
    let server = select_best_server(&appstate.pool, &session.user, filter.protocol).await?;
    Ok(ApiResponse::new(json!(server), StatusCode::OK))
}

pub(crate) async fn get_server(
    State(appstate): State<AppState>,
    session: SessionInfo,
    Path(id): Path<Id>,
) -> ApiResult {
    let server = find_server(&appstate.pool, id).await?;
    if !server.is_active {
        return Err(WebError::ObjectNotFound(format!(
            "Relay server {id} not found"
        )));
    }
    if server.is_premium && !session.user.role.has_premium_access() {
        return Err(WebError::Forbidden(
            "Premium relay requires a premium subscription".into(),
        ));
    }
    Ok(ApiResponse::new(json!(server), StatusCode::OK))
}

/// Full connection details including embedded relay credentials. Gated the
/// same way as admission: premium tier and remaining data allowance.
pub(crate) async fn connect_info(
    State(appstate): State<AppState>,
    session: SessionInfo,
    Path(id): Path<Id>,
) -> ApiResult {
    let server = find_server(&appstate.pool, id).await?;
    if !server.is_active {
        return Err(WebError::ObjectNotFound(format!(
            "Relay server {id} not found"
        )));
    }
    if server.is_premium && !session.user.role.has_premium_access() {
        return Err(WebError::Forbidden(
            "Premium relay requires a premium subscription".into(),
        ));
    }
    if session.user.quota_exceeded() {
        return Err(WebError::Forbidden("Data limit exceeded".into()));
    }
    Ok(ApiResponse::new(
        json!({
            "server_id": server.id,
            "name": server.name,
            "host": server.host,
            "port": server.port,
            "protocol": server.protocol,
            "ssh_port": server.ssh_port,
            "ssl_port": server.ssl_port,
            "udp_port": server.udp_port,
            "username": server.username,
            "password": server.password,
            "sni_host": server.sni_host,
            "ssl_payload": server.ssl_payload,
            "country": server.country,
            "country_code": server.country_code,
        }),
        StatusCode::OK,
    ))
}

pub(crate) async fn add_server(
    State(appstate): State<AppState>,
    _admin: AdminRole,
    Json(data): Json<ServerData>,
) -> ApiResult {
    let mut server = RelayServer::new(data.name.clone(), data.host.clone(), data.port, data.protocol);
    data.apply(&mut server);
    let server = server.save(&appstate.pool).await?;
    info!("Created relay server {server}");
    Ok(ApiResponse::new(json!(server), StatusCode::CREATED))
}

pub(crate) async fn modify_server(
    State(appstate): State<AppState>,
    _admin: AdminRole,
    Path(id): Path<Id>,
    Json(data): Json<ServerData>,
) -> ApiResult {
    let mut server = find_server(&appstate.pool, id).await?;
    data.apply(&mut server);
    server.save(&appstate.pool).await?;
    info!("Updated relay server {server}");
    Ok(ApiResponse::new(json!(server), StatusCode::OK))
}

pub(crate) async fn delete_server(
    State(appstate): State<AppState>,
    _admin: AdminRole,
    Path(id): Path<Id>,
) -> ApiResult {
    let server = find_server(&appstate.pool, id).await?;
    info!("Deleting relay server {server}");
    server.delete(&appstate.pool).await?;
    Ok(ApiResponse::new(
        json!({ "msg": "Relay server deleted" }),
        StatusCode::OK,
    ))
}

/// Live occupancy view of one relay.
pub(crate) async fn server_stats(
    State(appstate): State<AppState>,
    _admin: AdminRole,
    Path(id): Path<Id>,
) -> ApiResult {
    let server = find_server(&appstate.pool, id).await?;
    let active_connections = server.connected_session_count(&appstate.pool).await?;
    Ok(ApiResponse::new(
        json!({
            "server_id": server.id,
            "server_name": server.name,
            "active_connections": active_connections,
            "current_users": server.current_users,
            "current_load": server.current_load,
            "max_users": server.max_users,
            "latency_ms": server.latency_ms,
            "bandwidth_mbps": server.bandwidth_mbps,
        }),
        StatusCode::OK,
    ))
}
