//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub db_max_connections: u32,
    pub log_level: Level,
    pub cors_origin: String,
    pub max_upload_bytes: usize,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub generation_model: String,
    /// Upper bound on the characters of one page sent to the generation service.
    pub generation_char_budget: usize,
    /// Minimum spacing between two consecutive generation calls.
    pub generation_min_interval: Duration,
    pub background_workers: usize,
    pub background_queue_capacity: usize,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address: SocketAddr = parse_or(&lookup, "BIND_ADDRESS", "0.0.0.0:3000".parse().ok())?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;
        let db_max_connections = parse_or(&lookup, "DB_MAX_CONNECTIONS", Some(5))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());
        let max_upload_bytes = parse_or(&lookup, "MAX_UPLOAD_BYTES", Some(10 * 1024 * 1024))?;

        // --- Generation Settings ---
        let openai_api_key = lookup("OPENAI_API_KEY");
        let openai_base_url = lookup("OPENAI_BASE_URL");
        let generation_model =
            lookup("GENERATION_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        let generation_char_budget = parse_or(&lookup, "GENERATION_CHAR_BUDGET", Some(4000))?;
        let interval_ms: u64 = parse_or(&lookup, "GENERATION_MIN_INTERVAL_MS", Some(500))?;

        // --- Background Runner Settings ---
        let background_workers: usize = parse_or(&lookup, "BACKGROUND_WORKERS", Some(4))?;
        if background_workers == 0 {
            return Err(ConfigError::InvalidValue(
                "BACKGROUND_WORKERS".to_string(),
                "at least one worker is required".to_string(),
            ));
        }
        let background_queue_capacity: usize =
            parse_or(&lookup, "BACKGROUND_QUEUE_CAPACITY", Some(64))?;
        if background_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "BACKGROUND_QUEUE_CAPACITY".to_string(),
                "the queue needs room for at least one job".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            db_max_connections,
            log_level,
            cors_origin,
            max_upload_bytes,
            openai_api_key,
            openai_base_url,
            generation_model,
            generation_char_budget,
            generation_min_interval: Duration::from_millis(interval_ms),
            background_workers,
            background_queue_capacity,
        })
    }
}

/// Parses `key` if present, otherwise falls back to `default`.
fn parse_or<T, F>(lookup: &F, key: &str, default: Option<T>) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string())),
        None => default.ok_or_else(|| ConfigError::MissingVar(key.to_string())),
    }
}
