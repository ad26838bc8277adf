use std::str::FromStr;

/// A configuration value that could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Server configuration loaded from environment variables.
///
/// All fields have sensible defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Interval between WebSocket pings in seconds (default: `30`).
    pub heartbeat_interval_secs: u64,
    /// PostgreSQL URL. `None` runs the server on the in-memory store.
    pub database_url: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                    |
    /// |---------------------------|----------------------------|
    /// | `HOST`                    | `0.0.0.0`                  |
    /// | `PORT`                    | `3000`                     |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                       |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                       |
    /// | `DATABASE_URL`            | unset                      |
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port = parse_var("PORT", "3000", "u16")?;

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs = parse_var("REQUEST_TIMEOUT_SECS", "30", "u64")?;
        let heartbeat_interval_secs = parse_var("HEARTBEAT_INTERVAL_SECS", "30", "u64")?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            heartbeat_interval_secs,
            database_url,
        })
    }
}

fn parse_var<T: FromStr>(
    var: &'static str,
    default: &str,
    expected: &'static str,
) -> Result<T, ConfigError> {
    let value = std::env::var(var).unwrap_or_else(|_| default.to_string());
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        expected,
        value,
    })
}
