//! Environment-based application configuration.

use std::time::Duration;

/// Default request timeout for push gateway HTTP calls.
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Application configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database URL.
    pub database_url: String,
    /// Timeout for a single push gateway dispatch attempt.
    pub http_timeout: Duration,
}

impl AppConfig {
    /// Build the configuration from environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:pushbeam.db?mode=rwc".to_string());

        let http_timeout = std::env::var("PUSHBEAM_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));

        Self {
            database_url,
            http_timeout,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:pushbeam.db?mode=rwc".to_string(),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}
