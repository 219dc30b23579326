//! Error types for scan-processor

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Decode Errors ===
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Unknown data version: {0}")]
    UnknownVersion(String),

    #[error("Invalid {field}: {reason}")]
    InvalidPayload { field: &'static str, reason: String },

    // === Write Protocol Errors ===
    #[error("Row {key} was created concurrently; a row with the same key already exists")]
    CreateConflict { key: String },

    #[error("Row {key} was updated concurrently; gave up after {attempts} attempt(s)")]
    UpdateConflict { key: String, attempts: u32 },

    // === Store Errors ===
    #[error("Row store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Corrupted row {key}: {reason}")]
    Corrupted { key: String, reason: String },

    // === Config Errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Queue Errors ===
    #[error("Unknown message id: {0}")]
    UnknownMessage(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Malformed input that redelivery cannot fix. The message is acked and dropped.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Error::MalformedEnvelope(_) | Error::UnknownVersion(_) | Error::InvalidPayload { .. }
        )
    }

    /// Lost a conditional-mutation race against another writer.
    pub fn is_condition_race(&self) -> bool {
        matches!(self, Error::CreateConflict { .. } | Error::UpdateConflict { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedEnvelope(e.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::InvalidConfig(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Internal(format!("Serialize error: {}", e))
    }
}
