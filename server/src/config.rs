//! Configuration management for the server.

use std::env;
use std::time::Duration;

/// Default bound on attempts for a transaction that keeps hitting conflicts.
pub const DEFAULT_MAX_TX_ATTEMPTS: u32 = 10;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL; `None` selects the in-memory store
    pub database_url: Option<String>,
    /// Maximum pooled database connections
    pub db_max_connections: u32,
    /// When set, requests must carry a bearer token
    pub auth_secret: Option<String>,
    /// Attempts per push/pull before a conflict is reported as fatal
    pub max_tx_attempts: u32,
    /// Upper bound on the time a single request may take
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            db_max_connections: 10,
            auth_secret: None,
            max_tx_attempts: DEFAULT_MAX_TX_ATTEMPTS,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = env::var("HOST").unwrap_or(defaults.host);

        let port = match env::var("PORT") {
            Ok(value) => value.parse().map_err(|_| ConfigError::InvalidPort)?,
            Err(_) => defaults.port,
        };

        let database_url = env::var("DATABASE_URL").ok().filter(|url| !url.is_empty());

        let db_max_connections = parse_or("DB_MAX_CONNECTIONS", defaults.db_max_connections)?;

        let auth_secret = env::var("AUTH_SECRET").ok();

        let max_tx_attempts = parse_or("MAX_TX_ATTEMPTS", defaults.max_tx_attempts)?;
        if max_tx_attempts == 0 {
            return Err(ConfigError::InvalidValue("MAX_TX_ATTEMPTS"));
        }

        let request_timeout = Duration::from_secs(parse_or(
            "REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        )?);

        Ok(Self {
            host,
            port,
            database_url,
            db_max_connections,
            auth_secret,
            max_tx_attempts,
            request_timeout,
        })
    }
}

fn parse_or<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidValue(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid value for {0}")]
    InvalidValue(&'static str),
}
