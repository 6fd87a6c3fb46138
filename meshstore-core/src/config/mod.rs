//! Configuration management for meshstore
//!
//! Defaults, `MESHSTORE_<SECTION>_<KEY>` environment overrides, TOML files and
//! validation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::core_data::PrivilegedKeys;
use crate::core_identity::PublicKey;
use crate::logging::LogLevel;

mod error;

pub use error::ConfigError;

const ENV_PREFIX: &str = "MESHSTORE";

/// Main application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub reaper: ReaperConfig,
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

/// Store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one snapshot file per data type
    pub data_dir: PathBuf,

    /// Slot cap per data type
    pub max_map_size: usize,

    #[serde(with = "humantime_serde")]
    pub snapshot_interval: Duration,

    /// Hex-encoded privileged public keys per authorized type name
    pub privileged_keys: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    pub enabled: bool,

    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

/// Bounds on reconciliation responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Upper bound on entries per inventory response
    pub max_items: usize,

    /// Byte budget per response, divided by a type's max payload size
    pub max_inventory_bytes: usize,

    /// Largest filter a node advertises or expects
    pub max_filter_entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
    pub with_target: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,

    /// Prometheus scrape endpoint
    pub bind_address: SocketAddr,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            max_map_size: 10_000,
            snapshot_interval: Duration::from_secs(300),
            privileged_keys: BTreeMap::new(),
        }
    }
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self { enabled: true, interval: Duration::from_secs(60) }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self { max_items: 1_000, max_inventory_bytes: 1_000_000, max_filter_entries: 10_000 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), json_format: false, with_target: true }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false, bind_address: SocketAddr::from(([127, 0, 0, 1], 9090)) }
    }
}

fn parse_var<T>(key: &str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| invalid_override(key, e))
}

fn invalid_override(key: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidOverride { var: format!("{}_{}", ENV_PREFIX, key), reason: reason.to_string() }
}

fn parse_duration(key: &str, value: String) -> Result<Duration, ConfigError> {
    humantime::parse_duration(&value).map_err(|e| invalid_override(key, e))
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: MESHSTORE_<SECTION>_<KEY>
    /// Example: MESHSTORE_STORE_DATA_DIR=/var/lib/meshstore
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| env::var(format!("{}_{}", ENV_PREFIX, key)).ok())
    }

    /// Apply overrides from `lookup`, keyed by `<SECTION>_<KEY>`
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(v) = lookup("STORE_DATA_DIR") {
            self.store.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("STORE_MAX_MAP_SIZE") {
            self.store.max_map_size = parse_var("STORE_MAX_MAP_SIZE", v)?;
        }
        if let Some(v) = lookup("STORE_SNAPSHOT_INTERVAL") {
            self.store.snapshot_interval = parse_duration("STORE_SNAPSHOT_INTERVAL", v)?;
        }

        if let Some(v) = lookup("REAPER_ENABLED") {
            self.reaper.enabled = parse_var("REAPER_ENABLED", v)?;
        }
        if let Some(v) = lookup("REAPER_INTERVAL") {
            self.reaper.interval = parse_duration("REAPER_INTERVAL", v)?;
        }

        if let Some(v) = lookup("SYNC_MAX_ITEMS") {
            self.sync.max_items = parse_var("SYNC_MAX_ITEMS", v)?;
        }
        if let Some(v) = lookup("SYNC_MAX_INVENTORY_BYTES") {
            self.sync.max_inventory_bytes = parse_var("SYNC_MAX_INVENTORY_BYTES", v)?;
        }
        if let Some(v) = lookup("SYNC_MAX_FILTER_ENTRIES") {
            self.sync.max_filter_entries = parse_var("SYNC_MAX_FILTER_ENTRIES", v)?;
        }

        if let Some(v) = lookup("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = lookup("LOG_JSON") {
            self.logging.json_format = parse_var("LOG_JSON", v)?;
        }

        if let Some(v) = lookup("METRICS_ENABLED") {
            self.metrics.enabled = parse_var("METRICS_ENABLED", v)?;
        }
        if let Some(v) = lookup("METRICS_BIND_ADDRESS") {
            self.metrics.bind_address = parse_var("METRICS_BIND_ADDRESS", v)?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;

        let config: Self = toml::from_str(&contents)?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.max_map_size == 0 {
            return Err(ConfigError::ValidationFailed("max_map_size must be greater than 0".to_string()));
        }
        if self.store.snapshot_interval.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "snapshot_interval must be greater than 0".to_string(),
            ));
        }
        if self.reaper.enabled && self.reaper.interval.is_zero() {
            return Err(ConfigError::ValidationFailed("reaper interval must be greater than 0".to_string()));
        }
        if self.sync.max_items == 0 || self.sync.max_inventory_bytes == 0 {
            return Err(ConfigError::ValidationFailed(
                "sync limits must be greater than 0".to_string(),
            ));
        }

        self.log_level()?;

        self.privileged_keys()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        LogLevel::from_str(&self.logging.level)
            .ok_or_else(|| ConfigError::ValidationFailed(format!("Invalid log level: {}", self.logging.level)))
    }

    /// Decoded privileged key sets, one per configured type
    pub fn privileged_keys(&self) -> Result<BTreeMap<String, Arc<PrivilegedKeys>>, ConfigError> {
        let mut sets = BTreeMap::new();
        for (type_name, keys) in &self.store.privileged_keys {
            let decoded = keys
                .iter()
                .map(|key| decode_public_key(type_name, key))
                .collect::<Result<Vec<_>, _>>()?;
            sets.insert(type_name.clone(), Arc::new(PrivilegedKeys::with_keys(decoded)));
        }
        Ok(sets)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
    }
}

fn decode_public_key(type_name: &str, hex_key: &str) -> Result<PublicKey, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidPrivilegedKey {
        type_name: type_name.to_string(),
        key: hex_key.to_string(),
        reason,
    };
    let bytes = hex::decode(hex_key).map_err(|e| invalid(e.to_string()))?;
    PublicKey::from_slice(&bytes).ok_or_else(|| invalid("expected 32 bytes".to_string()))
}
