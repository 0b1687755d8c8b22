//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `WAGERLINE_` prefix and nested values use underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use wagerline::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {}", config.server.socket_addr());
//! ```

mod error;
mod rate_limit;
mod redis;
mod server;

pub use error::{ConfigError, ValidationError};
pub use rate_limit::{parse_window_ms, RateLimitConfig, TierPolicyConfig};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration
///
/// Contains all configuration sections for the WagerLine rate governor.
/// Load using [`AppConfig::load()`] which reads from environment variables.
///
/// Every section has defaults, so the governor boots with zero environment
/// configuration: without a Redis URL it runs entirely on the in-process
/// fallback limiter.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    /// Server configuration (host, port, environment)
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis configuration (shared counting store; optional)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Rate limit policies per endpoint tier
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `WAGERLINE` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `WAGERLINE__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `WAGERLINE__REDIS__URL=...` -> `redis.url = ...`
    /// - `WAGERLINE__RATE_LIMIT__AUTH__MAX_REQUESTS=5` -> `rate_limit.auth.max_requests = 5`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("WAGERLINE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.redis.validate()?;
        self.rate_limit.validate()?;
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn clear_env() {
        env::remove_var("WAGERLINE__REDIS__URL");
        env::remove_var("WAGERLINE__SERVER__PORT");
        env::remove_var("WAGERLINE__SERVER__ENVIRONMENT");
        env::remove_var("WAGERLINE__RATE_LIMIT__AUTH__MAX_REQUESTS");
        env::remove_var("WAGERLINE__RATE_LIMIT__AUTH__WINDOW");
    }

    #[test]
    fn test_load_with_no_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let result = AppConfig::load();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert!(config.redis.url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_redis_url_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("WAGERLINE__REDIS__URL", "redis://localhost:6379");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.redis.url.as_deref(), Some("redis://localhost:6379"));
    }

    #[test]
    fn test_tier_policy_override_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("WAGERLINE__RATE_LIMIT__AUTH__MAX_REQUESTS", "3");
        env::set_var("WAGERLINE__RATE_LIMIT__AUTH__WINDOW", "5 m");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert_eq!(config.rate_limit.auth.max_requests, 3);
        assert_eq!(config.rate_limit.auth.window, "5 m");
    }

    #[test]
    fn test_server_defaults() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        let config = AppConfig::load().unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.environment, Environment::Development);
    }

    #[test]
    fn test_is_production() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        env::set_var("WAGERLINE__SERVER__ENVIRONMENT", "production");
        let result = AppConfig::load();
        clear_env();

        let config = result.unwrap();
        assert!(config.is_production());
    }
}
