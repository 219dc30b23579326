//! Configuration for scan-processor components
//!
//! Layered the usual way: built-in defaults, then an optional TOML file, then
//! `SCAN_PROCESSOR__<SECTION>__<FIELD>` environment variables. CLI flags are
//! applied on top by the binary.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "SCAN_PROCESSOR";

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            dispatcher: DispatcherConfig::default(),
            queue: QueueConfig::default(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Sled,
}

/// Row store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Data directory for the sled backend
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_backend() -> StoreBackend {
    if cfg!(feature = "sled-backend") {
        StoreBackend::Sled
    } else {
        StoreBackend::Memory
    }
}
fn default_store_path() -> PathBuf {
    PathBuf::from("./scan-data")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            path: default_store_path(),
        }
    }
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Upper bound on concurrently running handlers
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Write attempts per message, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_in_flight() -> usize {
    64
}
fn default_max_attempts() -> u32 {
    2
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// In-process queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Deliveries before a message is dead-lettered
    #[serde(default = "default_max_deliveries")]
    pub max_deliveries: u32,
}

fn default_max_deliveries() -> u32 {
    5
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_deliveries: default_max_deliveries(),
        }
    }
}

impl ProcessorConfig {
    /// Load from an optional TOML file plus environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config: ProcessorConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.max_in_flight == 0 {
            return Err(Error::InvalidConfig(
                "dispatcher.max_in_flight must be at least 1".into(),
            ));
        }
        if self.dispatcher.max_attempts == 0 {
            return Err(Error::InvalidConfig(
                "dispatcher.max_attempts must be at least 1".into(),
            ));
        }
        if self.queue.max_deliveries == 0 {
            return Err(Error::InvalidConfig(
                "queue.max_deliveries must be at least 1".into(),
            ));
        }
        if self.store.backend == StoreBackend::Sled && !cfg!(feature = "sled-backend") {
            return Err(Error::InvalidConfig(
                "store.backend = \"sled\" requires the sled-backend feature".into(),
            ));
        }
        Ok(())
    }
}
