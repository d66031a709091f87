//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use reminders_core::{snooze_length, CatchUp};
use std::net::SocketAddr;
use std::path::PathBuf;
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
    /// A PostgreSQL URL, or `memory` for the in-process store.
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub ai_timeout: Duration,
    pub catch_up: CatchUp,
    pub notifications_enabled: bool,
    pub notification_tick: Duration,
    pub snooze_minutes: i64,
    pub avatar_dir: PathBuf,
    pub public_base_url: String,
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

        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:5173".to_string());

        // --- Load API Keys (as optional) ---
        let gemini_api_key = std::env::var("GEMINI_API_KEY").ok();
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();

        // --- Load Adapter-specific Settings ---
        let gemini_model =
            std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-1.5-flash".to_string());
        let openai_model =
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let ai_timeout = Duration::from_secs(parse_var("AI_TIMEOUT_SECS", 30u64)?);

        // --- Load Reminder and Notification Settings ---
        let catch_up = parse_var("RECURRENCE_CATCH_UP", CatchUp::OnePeriod)?;
        let notifications_enabled = parse_var("NOTIFICATIONS_ENABLED", true)?;
        let notification_tick = Duration::from_secs(parse_var("NOTIFICATION_TICK_SECS", 15u64)?);
        let snooze_minutes = parse_var("SNOOZE_MINUTES", 60i64)?;
        snooze_length(snooze_minutes)
            .map_err(|e| ConfigError::InvalidValue("SNOOZE_MINUTES".to_string(), e.to_string()))?;

        // --- Load Storage Settings ---
        let avatar_dir = std::env::var("AVATAR_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./avatars"));
        let public_base_url = std::env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            gemini_api_key,
            gemini_model,
            openai_api_key,
            openai_model,
            ai_timeout,
            catch_up,
            notifications_enabled,
            notification_tick,
            snooze_minutes,
            avatar_dir,
            public_base_url,
        })
    }

    pub fn uses_memory_db(&self) -> bool {
        self.database_url.eq_ignore_ascii_case("memory")
    }
}

/// Reads an optional variable, falling back to `default` when it is unset.
fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_uses_default_when_unset() {
        let value = parse_var("REMINDERS_TEST_SURELY_UNSET", 42u64).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn parse_var_reports_the_variable_name() {
        std::env::set_var("REMINDERS_TEST_BAD_NUMBER", "many");
        let err = parse_var("REMINDERS_TEST_BAD_NUMBER", 1u64).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(ref name, _) if name == "REMINDERS_TEST_BAD_NUMBER"));
    }

    #[test]
    fn catch_up_reads_from_the_environment() {
        std::env::set_var("REMINDERS_TEST_CATCH_UP", "skip-missed");
        let value = parse_var("REMINDERS_TEST_CATCH_UP", CatchUp::OnePeriod).unwrap();
        assert_eq!(value, CatchUp::SkipMissed);
    }
}
