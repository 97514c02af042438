//! Configuration loading and validation

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

/// Chain indexing API settings
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

/// Snapshot persistence settings
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// JSON snapshot path; in-memory only when unset
    #[serde(default)]
    pub persistence_path: Option<String>,
}

fn default_api_url() -> String {
    "https://api.idena.io/api".to_string()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    250
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Start with defaults
            .set_default("oracle.api_url", default_api_url())?
            .set_default("oracle.timeout_ms", default_timeout_ms() as i64)?
            .set_default("oracle.max_retries", default_max_retries() as i64)?
            .set_default(
                "oracle.retry_base_delay_ms",
                default_retry_base_delay_ms() as i64,
            )?
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix GOVERN_)
            .add_source(
                config::Environment::with_prefix("GOVERN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.oracle.api_url.is_empty() {
            anyhow::bail!("oracle.api_url must not be empty");
        }
        if !self.oracle.api_url.starts_with("http") {
            anyhow::bail!("Invalid oracle.api_url: {}", self.oracle.api_url);
        }
        if self.oracle.timeout_ms == 0 {
            anyhow::bail!("oracle.timeout_ms must be greater than zero");
        }
        Ok(())
    }

    /// Effective configuration for display
    pub fn display(&self) -> String {
        format!(
            r#"Configuration:
  Oracle:
    api_url: {}
    timeout: {}ms
    max_retries: {}
    retry_base_delay: {}ms
  Store:
    persistence_path: {}
"#,
            self.oracle.api_url,
            self.oracle.timeout_ms,
            self.oracle.max_retries,
            self.oracle.retry_base_delay_ms,
            self.store.persistence_path.as_deref().unwrap_or("(in-memory)"),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            oracle: OracleConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.oracle.timeout_ms, 5_000);
        assert_eq!(config.oracle.max_retries, 3);
        assert!(config.store.persistence_path.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut config = Config::default();
        config.oracle.api_url = "not-a-url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = Config::load("does-not-exist.toml").unwrap();
        assert_eq!(config.oracle.api_url, default_api_url());
    }
}
