//! Scan table layout
//!
//! One row per `"<ip> <port> <service>"`, one cell per family:
//!
//! ```text
//! timestamp  8 bytes, big-endian i64
//! ip         UTF-8
//! port       4 bytes, big-endian u32
//! service    UTF-8
//! data       UTF-8
//! ```

use crate::common::{Error, Result};
use crate::record::{RowKey, ScanRecord};
use crate::store::{Mutation, Row};
use serde::Serialize;

pub const TABLE_NAME: &str = "scans";

pub const TIMESTAMP_FAMILY: &str = "timestamp";
pub const IP_FAMILY: &str = "ip";
pub const PORT_FAMILY: &str = "port";
pub const SERVICE_FAMILY: &str = "service";
pub const DATA_FAMILY: &str = "data";

pub const FAMILIES: [&str; 5] = [
    TIMESTAMP_FAMILY,
    IP_FAMILY,
    PORT_FAMILY,
    SERVICE_FAMILY,
    DATA_FAMILY,
];

pub fn encode_timestamp(timestamp: i64) -> [u8; 8] {
    timestamp.to_be_bytes()
}

pub fn decode_timestamp(key: &RowKey, raw: &[u8]) -> Result<i64> {
    let bytes: [u8; 8] = raw.try_into().map_err(|_| Error::Corrupted {
        key: key.to_string(),
        reason: format!("timestamp cell is {} bytes, expected 8", raw.len()),
    })?;
    Ok(i64::from_be_bytes(bytes))
}

pub fn encode_port(port: u32) -> [u8; 4] {
    port.to_be_bytes()
}

pub fn decode_port(key: &RowKey, raw: &[u8]) -> Result<u32> {
    let bytes: [u8; 4] = raw.try_into().map_err(|_| Error::Corrupted {
        key: key.to_string(),
        reason: format!("port cell is {} bytes, expected 4", raw.len()),
    })?;
    Ok(u32::from_be_bytes(bytes))
}

/// Cells that change whenever a newer record wins: `data` and `timestamp`
/// always travel together.
pub fn update_mutation(record: &ScanRecord) -> Mutation {
    Mutation::new()
        .set(DATA_FAMILY, record.data.as_bytes())
        .set(TIMESTAMP_FAMILY, encode_timestamp(record.timestamp))
}

/// Every cell, for the first write of a key.
pub fn create_mutation(record: &ScanRecord) -> Mutation {
    update_mutation(record)
        .set(IP_FAMILY, record.ip.as_bytes())
        .set(SERVICE_FAMILY, record.service.as_bytes())
        .set(PORT_FAMILY, encode_port(record.port))
}

/// A fully decoded stored row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanRow {
    pub key: String,
    pub ip: String,
    pub port: u32,
    pub service: String,
    pub timestamp: i64,
    pub data: String,
}

impl ScanRow {
    pub fn from_row(key: &RowKey, row: &Row) -> Result<Self> {
        let cell = |family: &'static str| {
            row.get(family).ok_or_else(|| Error::Corrupted {
                key: key.to_string(),
                reason: format!("missing {} cell", family),
            })
        };
        let text = |family: &'static str| -> Result<String> {
            String::from_utf8(cell(family)?.to_vec()).map_err(|_| Error::Corrupted {
                key: key.to_string(),
                reason: format!("{} cell is not UTF-8", family),
            })
        };

        Ok(Self {
            key: key.to_string(),
            ip: text(IP_FAMILY)?,
            port: decode_port(key, cell(PORT_FAMILY)?)?,
            service: text(SERVICE_FAMILY)?,
            timestamp: decode_timestamp(key, cell(TIMESTAMP_FAMILY)?)?,
            data: text(DATA_FAMILY)?,
        })
    }
}
