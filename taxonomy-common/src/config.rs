//! Bootstrap configuration loading
//!
//! Configuration file resolution follows a fixed priority order:
//! 1. Command-line argument (highest priority)
//! 2. `TAXONOMY_CONFIG` environment variable
//! 3. `~/.config/taxonomy/taxonomy.toml`
//! 4. Built-in defaults (no file)
//!
//! A missing or absent TOML file is never fatal: the service logs a warning
//! and starts with defaults. Runtime values such as vendor credentials and
//! verification thresholds may additionally live in the `settings` table,
//! which takes priority over this file (see the connector's `config` module).

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "TAXONOMY_CONFIG";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Address the REST server binds to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// JSON catalog consumed by the file-backed content provider
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub vendor: VendorConfig,

    #[serde(default)]
    pub verification: VerificationConfig,

    #[serde(default)]
    pub api: ApiConfig,

    /// Search index credentials (indexing disabled when absent)
    #[serde(default)]
    pub algolia: Option<AlgoliaConfig>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: default_bind_address(),
            catalog_path: None,
            logging: LoggingConfig::default(),
            vendor: VendorConfig::default(),
            verification: VerificationConfig::default(),
            api: ApiConfig::default(),
            algolia: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Taxonomy vendor (EMSI/Lightcast) connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VendorConfig {
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,

    #[serde(default = "default_access_token_url")]
    pub access_token_url: String,

    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// Seconds before expiry at which a cached token is considered stale
    #[serde(default = "default_token_expiry_threshold")]
    pub access_token_expiry_threshold_in_seconds: i64,

    /// Outbound requests per second
    #[serde(default = "default_rate_limit_per_sec")]
    pub rate_limit_per_sec: u32,

    /// Attempts made on HTTP 429 before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay after a 429, doubled on each retry
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for VendorConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            access_token_url: default_access_token_url(),
            api_base_url: default_api_base_url(),
            access_token_expiry_threshold_in_seconds: default_token_expiry_threshold(),
            rate_limit_per_sec: default_rate_limit_per_sec(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Xblock skill verification thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationConfig {
    #[serde(default)]
    pub min_votes_for_skills: Option<i64>,

    #[serde(default)]
    pub ratio_threshold_for_skills: Option<f64>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            min_votes_for_skills: None,
            ratio_threshold_for_skills: None,
        }
    }
}

/// REST API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Requests per minute allowed per client in `taxonomy-api-throttle-scope`
    #[serde(default = "default_throttle_per_minute")]
    pub throttle_per_minute: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            throttle_per_minute: default_throttle_per_minute(),
        }
    }
}

/// Algolia search index settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgoliaConfig {
    pub application_id: String,
    pub api_key: String,
    pub index_name: String,
    /// Override for the Algolia host (defaults to `https://{application_id}.algolia.net`)
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("taxonomy").join("taxonomy.db"))
        .unwrap_or_else(|| PathBuf::from("./taxonomy.db"))
}

fn default_bind_address() -> String {
    "127.0.0.1:5780".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_access_token_url() -> String {
    "https://auth.emsicloud.com/connect/token".to_string()
}

fn default_api_base_url() -> String {
    "https://emsiservices.com".to_string()
}

fn default_token_expiry_threshold() -> i64 {
    60
}

fn default_rate_limit_per_sec() -> u32 {
    5
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_throttle_per_minute() -> u32 {
    120
}

/// Resolves which TOML file (if any) to load
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    cli_path: Option<PathBuf>,
}

impl ConfigResolver {
    pub fn new(cli_path: Option<PathBuf>) -> Self {
        Self { cli_path }
    }

    /// Return the config file path by priority, or None when no file applies
    pub fn resolve_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            return Some(path.clone());
        }

        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.trim().is_empty() {
                return Some(PathBuf::from(path));
            }
        }

        let user_config = dirs::config_dir().map(|d| d.join("taxonomy").join("taxonomy.toml"));
        match user_config {
            Some(path) if path.exists() => Some(path),
            _ => None,
        }
    }

    /// Load the resolved configuration, falling back to defaults
    ///
    /// A path given explicitly on the command line must exist and parse.
    /// Paths found any other way degrade to defaults with a warning.
    pub fn load(&self) -> Result<TomlConfig> {
        let Some(path) = self.resolve_path() else {
            info!("No config file found, using built-in defaults");
            return Ok(TomlConfig::default());
        };

        match load_toml_config(&path) {
            Ok(config) => {
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) if self.cli_path.is_none() => {
                warn!("Ignoring config file {}: {}. Using defaults.", path.display(), e);
                Ok(TomlConfig::default())
            }
            Err(e) => Err(e),
        }
    }
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_complete() {
        let config = TomlConfig::default();
        assert_eq!(config.bind_address, "127.0.0.1:5780");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.vendor.access_token_expiry_threshold_in_seconds, 60);
        assert_eq!(config.vendor.rate_limit_per_sec, 5);
        assert!(config.vendor.client_id.is_none());
        assert!(config.algolia.is_none());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: TomlConfig = toml::from_str(
            r#"
            database_path = "/tmp/t.db"

            [vendor]
            client_id = "abc"
            max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/t.db"));
        assert_eq!(config.vendor.client_id.as_deref(), Some("abc"));
        assert_eq!(config.vendor.max_retries, 5);
        assert_eq!(config.vendor.retry_base_delay_ms, 1000);
        assert_eq!(config.api.throttle_per_minute, 120);
    }
}
