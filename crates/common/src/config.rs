use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;
use crate::types::RequestSource;

const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Global worker configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Telegram bot token
    pub telegram_bot_token: String,

    /// Telegram Bot API base URL (overridable for local gateways and tests)
    pub telegram_api_url: String,

    /// Claim cycle interval in milliseconds (default: 3000)
    pub poll_interval_ms: u64,

    /// Maximum number of requests claimed per cycle (default: 5)
    pub max_batch_size: u32,

    /// Use TLS for the store connection (default: true)
    pub db_ssl: bool,

    /// Verify the store's TLS certificate (default: false)
    pub db_ssl_reject_unauthorized: bool,

    /// Maximum number of PostgreSQL connections in the pool (default: 5)
    pub db_max_connections: u32,

    /// Upper bound on a single channel call in milliseconds (default: 10000)
    pub channel_timeout_ms: u64,

    /// Which request source drives the worker (default: queue_poll)
    pub request_source: RequestSource,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AppError::Config(format!("{key} environment variable is required")))
        };

        let config = Self {
            database_url: required("DATABASE_URL")?,
            telegram_bot_token: required("TELEGRAM_BOT_TOKEN")?,
            telegram_api_url: lookup("TELEGRAM_API_URL")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string()),
            poll_interval_ms: parse_or(&lookup, "POLL_INTERVAL_MS", 3000, "u64")?,
            max_batch_size: parse_or(&lookup, "MAX_BATCH_SIZE", 5, "u32")?,
            db_ssl: bool_or(&lookup, "DB_SSL", true)?,
            db_ssl_reject_unauthorized: bool_or(&lookup, "DB_SSL_REJECT_UNAUTHORIZED", false)?,
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 5, "u32")?,
            channel_timeout_ms: parse_or(&lookup, "CHANNEL_TIMEOUT_MS", 10_000, "u64")?,
            request_source: match lookup("REQUEST_SOURCE") {
                Some(raw) => raw.parse().map_err(AppError::Config)?,
                None => RequestSource::default(),
            },
        };

        if config.max_batch_size == 0 {
            return Err(AppError::Config(
                "MAX_BATCH_SIZE must be at least 1".to_string(),
            ));
        }
        if config.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "POLL_INTERVAL_MS must be at least 1".to_string(),
            ));
        }

        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_millis(self.channel_timeout_ms)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T, type_name: &str) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} must be a valid {type_name}"))),
        None => Ok(default),
    }
}

fn bool_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(AppError::Config(format!("{key} must be a boolean"))),
        },
    }
}
