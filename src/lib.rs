//! # scan-processor
//!
//! Ingests scan events from an at-least-once queue and keeps, per
//! `(ip, port, service)`, only the most recent observation:
//! - Last writer wins by logical timestamp, ties keep the stored value
//! - Built on a row store whose only concurrency primitive is a single-row
//!   conditional mutation
//! - Bounded internal retry, everything else is left to queue redelivery
//! - Messages are acked or nacked according to the actual write outcome
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  Message   ┌──────────────────┐
//! │ MessageSource│───────────▶│ MessageDispatcher │──── ack / nack ───┐
//! └──────▲───────┘            └────────┬─────────┘                   │
//!        └─────────────────────────────┼─────────────────────────────┘
//!                                      │ bytes
//!                             ┌────────▼─────────┐
//!                             │  PayloadDecoder  │  v1 base64 / v2 text
//!                             └────────┬─────────┘
//!                                      │ ScanRecord
//!                             ┌────────▼─────────┐
//!                             │ WriteCoordinator │  read ts → conditional write
//!                             └────────┬─────────┘
//!                                      │
//!                             ┌────────▼─────────┐
//!                             │     RowStore     │  memory | sled
//!                             └──────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Ingest newline-delimited JSON envelopes
//! scan-processor ingest --input scans.ndjson --store ./scan-data
//!
//! # Inspect a stored row
//! scan-processor get 10.0.0.1 443 tls --store ./scan-data
//!
//! # Startup probe
//! scan-processor check --store ./scan-data
//! ```

pub mod common;
pub mod coordinator;
pub mod ingest;
pub mod record;
pub mod store;

// Re-export commonly used types
pub use common::{Error, ProcessorConfig, Result};
pub use coordinator::{PutOutcome, RetryPolicy, WriteCoordinator};
pub use ingest::{MemoryQueue, MessageDispatcher, MessageSource, PayloadDecoder};
pub use record::{RowKey, ScanRecord};
pub use store::RowStore;

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
