//! Scan envelope decoding
//!
//! Envelope shape:
//!
//! ```json
//! {"ip": "10.0.0.1", "port": 443, "service": "tls", "timestamp": 1700000000,
//!  "data_version": "v1", "data": {"response_bytes_utf8": "aGVsbG8="}}
//! ```
//!
//! v2 carries the already-decoded text as `{"response_str": "hello"}`.
//! Every error produced here is a decode error: redelivery cannot fix it.

use crate::common::{Error, Result};
use crate::record::ScanRecord;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Wire envelope, before the payload version is resolved
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEnvelope {
    pub ip: String,
    pub port: u32,
    pub service: String,
    pub timestamp: i64,
    pub data_version: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V1Payload {
    /// Base64 of the raw response bytes
    pub response_bytes_utf8: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct V2Payload {
    pub response_str: String,
}

/// `data_version` tag of base64 payloads
pub const V1_TAG: &str = "v1";
/// `data_version` tag of plain-text payloads
pub const V2_TAG: &str = "v2";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPayload {
    V1(V1Payload),
    V2(V2Payload),
}

impl ScanPayload {
    /// Resolve the payload shape from its version tag.
    pub fn parse(version: &str, data: serde_json::Value) -> Result<Self> {
        match version {
            V1_TAG => Ok(ScanPayload::V1(serde_json::from_value(data)?)),
            V2_TAG => Ok(ScanPayload::V2(serde_json::from_value(data)?)),
            other => Err(Error::UnknownVersion(other.to_string())),
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            ScanPayload::V1(_) => V1_TAG,
            ScanPayload::V2(_) => V2_TAG,
        }
    }

    /// Response text, decoded as far as the version requires.
    pub fn into_text(self) -> Result<String> {
        match self {
            ScanPayload::V1(payload) => {
                let bytes = STANDARD.decode(payload.response_bytes_utf8.as_bytes()).map_err(|e| {
                    Error::InvalidPayload {
                        field: "response_bytes_utf8",
                        reason: e.to_string(),
                    }
                })?;
                String::from_utf8(bytes).map_err(|e| Error::InvalidPayload {
                    field: "response_bytes_utf8",
                    reason: e.to_string(),
                })
            }
            ScanPayload::V2(payload) => Ok(payload.response_str),
        }
    }
}

/// Normalizes raw message bytes into a `ScanRecord`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadDecoder;

impl PayloadDecoder {
    pub fn new() -> Self {
        Self
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<ScanRecord> {
        let envelope: ScanEnvelope = serde_json::from_slice(bytes)?;
        self.decode_envelope(envelope)
    }

    pub fn decode_envelope(&self, envelope: ScanEnvelope) -> Result<ScanRecord> {
        validate_key_part("ip", &envelope.ip)?;
        validate_key_part("service", &envelope.service)?;

        let payload = ScanPayload::parse(&envelope.data_version, envelope.data)?;
        let data = payload.into_text()?;

        Ok(ScanRecord {
            ip: envelope.ip,
            port: envelope.port,
            service: envelope.service,
            timestamp: envelope.timestamp,
            data,
        })
    }
}

/// Key parts are space-joined, so they must be non-empty and space-free.
fn validate_key_part(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidPayload {
            field,
            reason: "empty".into(),
        });
    }
    if value.chars().any(char::is_whitespace) {
        return Err(Error::InvalidPayload {
            field,
            reason: format!("contains whitespace: {:?}", value),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope(version: &str, data: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "ip": "10.0.0.1",
            "port": 443,
            "service": "tls",
            "timestamp": 100,
            "data_version": version,
            "data": data,
        }))
        .unwrap()
    }

    #[test]
    fn test_v1_base64() {
        let bytes = envelope("v1", json!({"response_bytes_utf8": "aGVsbG8gd29ybGQ="}));
        let record = PayloadDecoder::new().decode(&bytes).unwrap();
        assert_eq!(record.data, "hello world");
        assert_eq!(record.port, 443);
        assert_eq!(record.timestamp, 100);
        assert_eq!(record.key().as_str(), "10.0.0.1 443 tls");
    }

    #[test]
    fn test_v2_passthrough() {
        let bytes = envelope("v2", json!({"response_str": "aGVsbG8="}));
        let record = PayloadDecoder::new().decode(&bytes).unwrap();
        // v2 text is never base64-decoded
        assert_eq!(record.data, "aGVsbG8=");
    }

    #[test]
    fn test_invalid_base64() {
        let bytes = envelope("v1", json!({"response_bytes_utf8": "not base64!!"}));
        let err = PayloadDecoder::new().decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidPayload {
                field: "response_bytes_utf8",
                ..
            }
        ));
        assert!(err.is_decode_error());
    }

    #[test]
    fn test_v1_non_utf8() {
        // 0xff 0xfe
        let bytes = envelope("v1", json!({"response_bytes_utf8": "//4="}));
        assert!(PayloadDecoder::new().decode(&bytes).unwrap_err().is_decode_error());
    }

    #[test]
    fn test_unknown_version() {
        let bytes = envelope("v3", json!({"response_str": "x"}));
        let err = PayloadDecoder::new().decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::UnknownVersion(ref v) if v == "v3"));
    }

    #[test]
    fn test_payload_shape_must_match_version() {
        let bytes = envelope("v1", json!({"response_str": "x"}));
        assert!(matches!(
            PayloadDecoder::new().decode(&bytes),
            Err(Error::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_malformed_envelope() {
        let decoder = PayloadDecoder::new();
        assert!(decoder.decode(b"not json").unwrap_err().is_decode_error());
        // port out of u32 range
        let bytes = serde_json::to_vec(&json!({
            "ip": "10.0.0.1", "port": -1, "service": "tls", "timestamp": 1,
            "data_version": "v2", "data": {"response_str": "x"}
        }))
        .unwrap();
        assert!(decoder.decode(&bytes).unwrap_err().is_decode_error());
    }

    #[test]
    fn test_key_parts_validated() {
        let bytes = serde_json::to_vec(&json!({
            "ip": "10.0.0.1", "port": 80, "service": "http proxy", "timestamp": 1,
            "data_version": "v2", "data": {"response_str": "x"}
        }))
        .unwrap();
        let err = PayloadDecoder::new().decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::InvalidPayload { field: "service", .. }));
    }

    #[test]
    fn test_payload_version_tag() {
        let v1 = ScanPayload::parse(V1_TAG, json!({"response_bytes_utf8": "eA=="})).unwrap();
        assert_eq!(v1.version(), "v1");
        assert_eq!(v1.into_text().unwrap(), "x");

        let v2 = ScanPayload::parse("v2", json!({"response_str": "x"})).unwrap();
        assert_eq!(v2.version(), V2_TAG);
        assert_eq!(v2, ScanPayload::V2(V2Payload { response_str: "x".into() }));
    }
}
