use std::net::SocketAddr;

use axum::{
    http::StatusCode,
    routing::{get, post},
    serve, Router,
};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultOnResponse, TraceLayer};
use tracing::Level;
use tunnelhub_common::{config::server_config, db::DbPool};

use crate::{
    appstate::AppState,
    handlers::{
        auth::{authenticate, logout, me, refresh_token, register, update_profile},
        connection::{
            connect, connection_history, disconnect, force_disconnect_user, live_connections,
        },
        server::{
            add_server, best_server, connect_info, delete_server, get_server, list_servers,
            modify_server, server_stats,
        },
        usage::{daily_usage, quota_status, usage_summary, user_daily_usage},
        user::{
            add_user, delete_user, get_user, list_users, lock_user_device, modify_user,
            unlock_user_device,
        },
    },
};

pub mod appstate;
pub mod auth;
pub mod connection_management;
pub mod db;
mod error;
pub mod handlers;
pub mod server_selection;
mod usage_aggregation;

pub use error::WebError;

#[macro_use]
extern crate tracing;

#[macro_use]
extern crate serde;

/// Simple health-check.
async fn health_check() -> &'static str {
    "alive"
}

async fn handle_404() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

pub fn build_webapp(pool: DbPool) -> Router {
    let webapp = Router::new().nest(
        "/api/v1",
        Router::new()
            .route("/health", get(health_check))
            // /auth
            .route("/auth", post(authenticate))
            .route("/auth/register", post(register))
            .route("/auth/refresh", post(refresh_token))
            .route("/auth/logout", post(logout))
            .route("/me", get(me).put(update_profile))
            // relay servers
            .route("/server", get(list_servers).post(add_server))
            .route("/server/best", get(best_server))
            .route(
                "/server/{id}",
                get(get_server).put(modify_server).delete(delete_server),
            )
            .route("/server/{id}/connect_info", get(connect_info))
            .route("/server/{id}/stats", get(server_stats))
            // connections
            .route("/connection", post(connect).get(connection_history))
            .route("/connection/live", get(live_connections))
            .route("/connection/{id}/disconnect", post(disconnect))
            // users
            .route("/user", get(list_users).post(add_user))
            .route(
                "/user/{username}",
                get(get_user).put(modify_user).delete(delete_user),
            )
            .route("/user/{username}/lock", post(lock_user_device))
            .route("/user/{username}/unlock", post(unlock_user_device))
            .route("/user/{username}/disconnect", post(force_disconnect_user))
            .route("/user/{username}/usage", get(user_daily_usage))
            // usage & quota
            .route("/usage", get(usage_summary))
            .route("/usage/daily", get(daily_usage))
            .route("/usage/quota", get(quota_status)),
    );

    webapp
        .fallback(handle_404)
        .layer(
            TraceLayer::new_for_http().on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(AppState::new(pool))
}

pub async fn run_web_server(pool: DbPool) -> Result<(), anyhow::Error> {
    let config = server_config();
    let webapp = build_webapp(pool);
    let addr = SocketAddr::new(config.http_bind_address, config.http_port);
    info!("Started web services");
    let listener = TcpListener::bind(&addr).await?;
    serve(listener, webapp.into_make_service())
        .await
        .map_err(Into::into)
}
