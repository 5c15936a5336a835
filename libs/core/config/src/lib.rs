//! Environment-driven configuration shared by the port event services.

pub mod kafka;
pub mod server;
pub mod tracing;

pub use kafka::{KafkaConfig, KafkaSecurity, MEMORY_BROKER};
pub use server::ServerConfig;

use std::env;
use std::str::FromStr;
use thiserror::Error;

/// Configuration error type
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Deployment flavour, selected by `APP_ENV`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    /// Local runs and docker-compose; pretty logs
    Development,
    /// Cluster deployment; JSON logs
    Production,
}

impl Environment {
    /// `APP_ENV=production` (any case) selects production, anything else development.
    pub fn from_env() -> Self {
        match env_optional("APP_ENV") {
            Some(value) if value.eq_ignore_ascii_case("production") => Environment::Production,
            _ => Environment::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

/// Configuration that can be loaded from environment variables
pub trait FromEnv: Sized {
    fn from_env() -> Result<Self, ConfigError>;
}

/// Read `key`, falling back to `default` when unset
pub fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

/// Parse `key` into `T`; `default` when unset, an error when present but unparsable
pub fn env_parse<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_optional(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::ParseError {
            key: key.to_string(),
            details: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Read `key`; blank values count as unset
pub fn env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_selection() {
        temp_env::with_var_unset("APP_ENV", || {
            assert_eq!(Environment::from_env(), Environment::Development);
        });
        temp_env::with_var("APP_ENV", Some("PRODUCTION"), || {
            assert!(Environment::from_env().is_production());
        });
        temp_env::with_var("APP_ENV", Some("staging"), || {
            assert_eq!(Environment::from_env(), Environment::Development);
        });
    }

    #[test]
    fn test_env_or_default() {
        temp_env::with_var("KAFKA_CLIENT_ID", Some("berth-planner"), || {
            assert_eq!(env_or_default("KAFKA_CLIENT_ID", "port-events"), "berth-planner");
        });
        temp_env::with_var("KAFKA_CLIENT_ID", Some(""), || {
            assert_eq!(env_or_default("KAFKA_CLIENT_ID", "port-events"), "port-events");
        });
    }

    #[test]
    fn test_env_parse() {
        temp_env::with_var_unset("CONSUMER_STARTUP_DELAY_MS", || {
            assert_eq!(env_parse("CONSUMER_STARTUP_DELAY_MS", 5_000u64).unwrap(), 5_000);
        });
        temp_env::with_var("CONSUMER_STARTUP_DELAY_MS", Some(" 250 "), || {
            assert_eq!(env_parse("CONSUMER_STARTUP_DELAY_MS", 5_000u64).unwrap(), 250);
        });
        temp_env::with_var("CONSUMER_STARTUP_DELAY_MS", Some("soon"), || {
            let err = env_parse("CONSUMER_STARTUP_DELAY_MS", 5_000u64).unwrap_err();
            assert!(err.to_string().contains("CONSUMER_STARTUP_DELAY_MS"));
        });
    }

    #[test]
    fn test_env_optional_blank_is_none() {
        temp_env::with_var("SMTP_HOST", Some("   "), || {
            assert_eq!(env_optional("SMTP_HOST"), None);
        });
    }
}
