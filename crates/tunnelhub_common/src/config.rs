use std::{net::IpAddr, sync::OnceLock};

use clap::Parser;
use humantime::Duration;
use secrecy::SecretString;

pub static SERVER_CONFIG: OnceLock<TunnelHubConfig> = OnceLock::new();

pub fn server_config() -> &'static TunnelHubConfig {
    SERVER_CONFIG
        .get()
        .expect("Server configuration not set yet")
}

#[derive(Clone, Debug, Parser)]
#[command(version)]
#[cfg_attr(test, command(ignore_errors(true)))]
pub struct TunnelHubConfig {
    #[arg(long, env = "TUNNELHUB_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "TUNNELHUB_DB_PATH", default_value = "tunnelhub.db")]
    pub database_path: String,

    #[arg(long, env = "TUNNELHUB_HTTP_PORT", default_value_t = 8000)]
    pub http_port: u16,

    #[arg(long, env = "TUNNELHUB_HTTP_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub http_bind_address: IpAddr,

    #[arg(
        long,
        env = "TUNNELHUB_DEFAULT_ADMIN_PASSWORD",
        default_value = "pass123"
    )]
    pub default_admin_password: SecretString,

    #[arg(long, env = "TUNNELHUB_AUTH_TOKEN_TIMEOUT", default_value = "30m")]
    pub auth_token_timeout: Duration,

    #[arg(long, env = "TUNNELHUB_REFRESH_TOKEN_TIMEOUT", default_value = "7d")]
    pub refresh_token_timeout: Duration,
}

impl TunnelHubConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::parse()
    }
}

impl Default for TunnelHubConfig {
    fn default() -> Self {
        Self::parse_from(["tunnelhub"])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TunnelHubConfig::default();
        assert_eq!(config.http_port, 8000);
        assert_eq!(config.auth_token_timeout.as_secs(), 30 * 60);
        assert_eq!(config.refresh_token_timeout.as_secs(), 7 * 24 * 3600);
    }
}
