//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use intern_tracker_core::persistence::{SaveSettings, DEFAULT_ERROR_DISPLAY, DEFAULT_IDLE_WINDOW};
use std::net::SocketAddr;
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
    pub log_level: Level,
    pub allowed_origin: String,
    pub openai_api_key: Option<String>,
    pub suggest_model: String,
    pub save: SaveSettings,
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

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let allowed_origin = std::env::var("ALLOWED_ORIGIN")
            .unwrap_or_else(|_| "http://localhost:5173".to_string());

        // --- Suggestion model (optional; without a key suggestions are empty) ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
        let suggest_model =
            std::env::var("SUGGEST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());

        // --- Save timing ---
        let save = SaveSettings {
            idle_window: duration_var("SAVE_IDLE_MS", DEFAULT_IDLE_WINDOW)?,
            error_display: duration_var("SAVE_ERROR_DISPLAY_MS", DEFAULT_ERROR_DISPLAY)?,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            allowed_origin,
            openai_api_key,
            suggest_model,
            save,
        })
    }
}

fn duration_var(name: &str, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(name) {
        Ok(raw) => parse_millis(name, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_millis(name: &str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
        _ => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a positive number of milliseconds", raw),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millis_are_parsed() {
        let d = parse_millis("SAVE_IDLE_MS", " 1500 ").unwrap();
        assert_eq!(d, Duration::from_millis(1500));
    }

    #[test]
    fn zero_or_garbage_is_rejected() {
        assert!(matches!(
            parse_millis("SAVE_IDLE_MS", "0"),
            Err(ConfigError::InvalidValue(name, _)) if name == "SAVE_IDLE_MS"
        ));
        assert!(parse_millis("SAVE_ERROR_DISPLAY_MS", "soon").is_err());
    }
}
