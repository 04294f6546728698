//! Gate configuration structures.
//!
//! `GateConfig` covers the transaction deadline, the adapter worker pool,
//! scan paging defaults, and the defaults used when a collection is created
//! for a new database.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MAX_IN_FLIGHT_OPS, DEFAULT_RETENTION_SECS, DEFAULT_TXN_TIMEOUT_MS,
    DEFAULT_WORKER_THREADS, SYS_SCHEMA_VERSION,
};
use crate::error::{GateError, GateResult};

/// Main gate configuration.
///
/// # Example
///
/// ```rust
/// use pgskv_common::config::GateConfig;
///
/// let config = GateConfig::from_toml_str("worker_threads = 2\ntxn_timeout = \"3s\"").unwrap();
/// assert_eq!(config.worker_threads, 2);
/// assert_eq!(config.txn_timeout.as_secs(), 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Deadline handed to every transaction at begin.
    #[serde(default = "default_txn_timeout", with = "humantime_serde")]
    pub txn_timeout: Duration,

    /// Number of adapter worker threads.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Maximum number of operations dispatched concurrently.
    #[serde(default = "default_max_in_flight_ops")]
    pub max_in_flight_ops: usize,

    /// Page limit applied when a scan request asks for no limit (0 = unlimited).
    #[serde(default)]
    pub default_page_limit: u64,

    /// Version the sys catalog schemas are expected at.
    #[serde(default = "default_sys_schema_version")]
    pub sys_schema_version: u32,

    /// Defaults for new collections.
    #[serde(default)]
    pub collection: CollectionConfig,
}

fn default_txn_timeout() -> Duration {
    Duration::from_millis(DEFAULT_TXN_TIMEOUT_MS)
}

fn default_worker_threads() -> usize {
    DEFAULT_WORKER_THREADS
}

fn default_max_in_flight_ops() -> usize {
    DEFAULT_MAX_IN_FLIGHT_OPS
}

fn default_sys_schema_version() -> u32 {
    SYS_SCHEMA_VERSION
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            txn_timeout: default_txn_timeout(),
            worker_threads: default_worker_threads(),
            max_in_flight_ops: default_max_in_flight_ops(),
            default_page_limit: 0,
            sys_schema_version: default_sys_schema_version(),
            collection: CollectionConfig::default(),
        }
    }
}

impl GateConfig {
    /// Creates a new default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a small configuration for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            txn_timeout: Duration::from_secs(5),
            worker_threads: 2,
            max_in_flight_ops: 16,
            ..Default::default()
        }
    }

    /// Parses a configuration from a TOML string and validates it.
    pub fn from_toml_str(content: &str) -> GateResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| GateError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a file.
    pub fn from_file(path: &Path) -> GateResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GateError::config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Saves configuration to a file.
    pub fn save(&self, path: &Path) -> GateResult<()> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GateError::config(format!("{}: {e}", parent.display())))?;
        }

        std::fs::write(path, content)
            .map_err(|e| GateError::config(format!("{}: {e}", path.display())))
    }

    /// Converts configuration to a TOML string.
    pub fn to_toml(&self) -> GateResult<String> {
        toml::to_string_pretty(self).map_err(|e| GateError::config(e.to_string()))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> GateResult<()> {
        if self.worker_threads == 0 {
            return Err(GateError::config("worker_threads must be at least 1"));
        }

        if self.max_in_flight_ops == 0 {
            return Err(GateError::config("max_in_flight_ops must be at least 1"));
        }

        if self.sys_schema_version != SYS_SCHEMA_VERSION {
            return Err(GateError::config(format!(
                "sys_schema_version must be {SYS_SCHEMA_VERSION}, got {}",
                self.sys_schema_version
            )));
        }

        Ok(())
    }
}

/// Defaults applied when a collection is created for a database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// Range partition boundaries. Non-empty selects range partitioning,
    /// empty selects hash partitioning.
    #[serde(default = "default_range_ends")]
    pub range_ends: Vec<String>,

    /// Storage driver tag.
    #[serde(default = "default_storage_driver")]
    pub storage_driver: String,

    /// How long data is retained.
    #[serde(default = "default_retention", with = "humantime_serde")]
    pub retention: Duration,

    /// Capacity hints.
    #[serde(default)]
    pub capacity: CapacityConfig,
}

fn default_range_ends() -> Vec<String> {
    vec![String::new()]
}

fn default_storage_driver() -> String {
    "K23SI".to_string()
}

fn default_retention() -> Duration {
    Duration::from_secs(DEFAULT_RETENTION_SECS)
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            range_ends: default_range_ends(),
            storage_driver: default_storage_driver(),
            retention: default_retention(),
            capacity: CapacityConfig::default(),
        }
    }
}

/// Capacity hints passed through to the storage substrate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityConfig {
    /// Expected data size in megabytes.
    #[serde(default)]
    pub data_capacity_mb: Option<u64>,

    /// Expected read operations per second.
    #[serde(default)]
    pub read_iops: Option<u64>,

    /// Expected write operations per second.
    #[serde(default)]
    pub write_iops: Option<u64>,
}

/// Serde helper for Duration using humantime format.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        s.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
