use anyhow::anyhow;
use secrecy::ExposeSecret;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tunnelhub_common::{
    config::{TunnelHubConfig, SERVER_CONFIG},
    db::init_db,
    VERSION,
};
use tunnelhub_core::{db::User, run_web_server};

#[macro_use]
extern crate tracing;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    if dotenvy::from_filename(".env.local").is_err() {
        dotenvy::dotenv().ok();
    }
    let config = TunnelHubConfig::new();
    SERVER_CONFIG
        .set(config.clone())
        .map_err(|_| anyhow!("server configuration already set"))?;
    // initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},sqlx=warn", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting TunnelHub version v{}", VERSION);
    debug!("Using config: {config:?}");

    let pool = init_db(&config.database_path).await;

    // initialize admin user
    User::init_admin_user(&pool, config.default_admin_password.expose_secret()).await?;

    run_web_server(pool).await
}
