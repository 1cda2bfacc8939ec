//! Application configuration
//!
//! Configuration is stored as JSON at `~/.config/hypercast/config.json`.
//! Every field has a default, so a missing file or a partial file is fine.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Application name used for config/data directory paths
const APP_NAME: &str = "hypercast";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Offline cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached entries kept after a write
    pub max_entries: usize,
    /// Lifetime of an entry written without an explicit TTL
    pub default_ttl_secs: u64,
    /// Storage identifier of the cache blob
    pub cache_key: String,
    /// Storage identifier of the network status record
    pub network_key: String,
    /// Byte quota of the backing store, if any
    pub quota_bytes: Option<usize>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 50,
            default_ttl_secs: 24 * 60 * 60, // 24 hours
            cache_key: "hypercast_offline_cache".to_string(),
            network_key: "hypercast_network_status".to_string(),
            quota_bytes: Some(5 * 1024 * 1024),
        }
    }
}

impl CacheConfig {
    /// Default TTL as a `Duration`
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }
}

/// Settings for the simulated weather source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Simulated round-trip latency in milliseconds
    pub latency_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { latency_ms: 300 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub gateway: GatewayConfig,
}

impl Config {
    /// Loads the config from the platform config directory, or defaults if absent
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Loads the config from a specific file, or defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Rejects settings the cache cannot honor
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("max_entries must be at least 1".into()));
        }
        if self.cache.default_ttl_secs == 0 {
            return Err(ConfigError::Invalid(
                "default_ttl_secs must be greater than zero".into(),
            ));
        }
        if self.cache.cache_key == self.cache.network_key {
            return Err(ConfigError::Invalid(
                "cache_key and network_key must differ".into(),
            ));
        }
        Ok(())
    }

    fn config_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("", "", APP_NAME)?;
        Some(dirs.config_dir().join(CONFIG_FILE))
    }
}
