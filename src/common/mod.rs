//! Common utilities and types shared across scan-processor

pub mod config;
pub mod error;
pub mod metrics;

pub use config::{DispatcherConfig, ProcessorConfig, QueueConfig, StoreBackend, StoreConfig};
pub use error::{Error, Result};
pub use metrics::{Counter, DispatchStats, StatsSnapshot};
