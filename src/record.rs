//! Normalized scan records and their row keys

use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded scan observation, independent of the envelope version it came in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    pub ip: String,
    pub port: u32,
    pub service: String,
    /// Logical observation time. Larger wins.
    pub timestamp: i64,
    pub data: String,
}

impl ScanRecord {
    pub fn key(&self) -> RowKey {
        RowKey::new(&self.ip, self.port, &self.service)
    }
}

/// Row key: `"<ip> <port> <service>"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey(String);

impl RowKey {
    pub fn new(ip: &str, port: u32, service: &str) -> Self {
        RowKey(format!("{} {} {}", ip, port, service))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RowKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
