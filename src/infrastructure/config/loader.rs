use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;
use crate::infrastructure::logging::logger::parse_log_level;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid requests_per_window: {0}. Must be at least 1")]
    InvalidBudget(u32),

    #[error("Invalid window_secs: {0}. Must be at least 1")]
    InvalidWindow(u64),

    #[error("Invalid max_attempts: {0}. Must be at least 1")]
    InvalidMaxAttempts(u32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid retryable status: {0}. Must be between 100 and 599")]
    InvalidStatus(u16),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid timeout: {0} must be at least 1 second")]
    InvalidTimeout(&'static str),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. llmlink.yaml (project config)
    /// 3. .llmlink/local.yaml (local overrides, optional)
    /// 4. Environment variables (LLMLINK_* prefix, `__` separates nesting)
    ///
    /// e.g. `LLMLINK_CLIENT__RETRY__MAX_ATTEMPTS=5`
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file("llmlink.yaml"))
            .merge(Yaml::file(".llmlink/local.yaml"))
            .merge(Env::prefixed("LLMLINK_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let client = &config.client;

        if client.rate_limit.requests_per_window == 0 {
            return Err(ConfigError::InvalidBudget(client.rate_limit.requests_per_window));
        }
        if client.rate_limit.window_secs == 0 {
            return Err(ConfigError::InvalidWindow(client.rate_limit.window_secs));
        }

        if client.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidMaxAttempts(client.retry.max_attempts));
        }
        if client.retry.initial_backoff_ms > client.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                client.retry.initial_backoff_ms,
                client.retry.max_backoff_ms,
            ));
        }
        if let Some(&status) = client
            .retry
            .retryable_statuses
            .iter()
            .find(|status| !(100..=599).contains(*status))
        {
            return Err(ConfigError::InvalidStatus(status));
        }

        if client.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("connect_timeout_secs"));
        }
        if client.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout("request_timeout_secs"));
        }

        if parse_log_level(&config.logging.level).is_err() {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{CompatVendor, ProviderKind};
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r"
client:
  provider: compat
  vendor: openrouter
  rate_limit:
    requests_per_window: 20
  retry:
    max_attempts: 4
    retryable_statuses: [429, 503]
logging:
  level: debug
  format: pretty
"
        )
        .unwrap();

        let config = ConfigLoader::load_from_file(file.path()).unwrap();
        assert_eq!(config.client.provider, ProviderKind::Compat);
        assert_eq!(config.client.vendor, CompatVendor::OpenRouter);
        assert_eq!(config.client.rate_limit.requests_per_window, 20);
        assert_eq!(config.client.rate_limit.window_secs, 60);
        assert_eq!(config.client.retry.max_attempts, 4);
        assert_eq!(config.client.retry.retryable_statuses, vec![429, 503]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_merges_files_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "llmlink.yaml",
                r"
client:
  provider: compat
  retry:
    max_attempts: 4
",
            )?;
            std::fs::create_dir(jail.directory().join(".llmlink")).map_err(|e| e.to_string())?;
            jail.create_file(
                ".llmlink/local.yaml",
                r"
client:
  vendor: groq
",
            )?;
            jail.set_env("LLMLINK_CLIENT__RETRY__MAX_ATTEMPTS", "7");

            let config = ConfigLoader::load().map_err(|e| e.to_string())?;
            assert_eq!(config.client.provider, ProviderKind::Compat);
            assert_eq!(config.client.vendor, CompatVendor::Groq);
            assert_eq!(config.client.retry.max_attempts, 7);
            Ok(())
        });
    }

    #[test]
    fn test_load_rejects_invalid_env_value() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("LLMLINK_CLIENT__RETRY__MAX_ATTEMPTS", "0");
            assert!(ConfigLoader::load().is_err());
            Ok(())
        });
    }

    #[test]
    fn test_validate_zero_attempts() {
        let mut config = Config::default();
        config.client.retry.max_attempts = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxAttempts(0))
        ));
    }

    #[test]
    fn test_validate_inverted_backoff() {
        let mut config = Config::default();
        config.client.retry.initial_backoff_ms = 20_000;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBackoff(20_000, 10_000))
        ));
    }

    #[test]
    fn test_validate_status_range() {
        let mut config = Config::default();
        config.client.retry.retryable_statuses.push(42);
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidStatus(42))
        ));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = Config::default();
        config.logging.level = "verbose".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_validate_zero_budget() {
        let mut config = Config::default();
        config.client.rate_limit.requests_per_window = 0;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidBudget(0))
        ));
    }
}
