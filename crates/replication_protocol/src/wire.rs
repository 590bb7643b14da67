//! Wire shapes for `GET /wal` and `POST /wal/apply` (spec.md §6).

use node_codec::Value;
use node_core::{DatabaseId, WalEntry};
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

/// A SQL parameter value on the wire.
///
/// Plain JSON cannot distinguish `int64` from `float64`, nor a `string`
/// from a `byte-string`, so each parameter is tagged with its variant
/// rather than serialized as a bare JSON scalar. An untagged
/// representation would let a parameter's wire round trip land on a
/// different [`Value`] variant than the one that produced the WAL entry's
/// hash, which would make a correctly-replicated entry fail hash
/// verification on the follower.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamWire {
    /// SQL `NULL`.
    Null,
    /// Boolean.
    Bool {
        /// The value.
        value: bool,
    },
    /// 64-bit signed integer.
    Int {
        /// The value.
        value: i64,
    },
    /// IEEE-754 double.
    Float {
        /// The value.
        value: f64,
    },
    /// UTF-8 text.
    String {
        /// The value.
        value: String,
    },
    /// Byte string, hex-encoded.
    Bytes {
        /// Lowercase hex encoding of the raw bytes.
        value: String,
    },
}

impl ParamWire {
    /// Converts a [`Value`] to its wire form. Fails for `Array`/`Map`,
    /// which are not part of the WAL parameter value union (spec.md §6).
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool { value: *b },
            Value::Integer(i) => Self::Int { value: *i },
            Value::Float(f) => Self::Float { value: *f },
            Value::Text(s) => Self::String { value: s.clone() },
            Value::Bytes(b) => Self::Bytes { value: encode_hex(b) },
            Value::Array(_) | Value::Map(_) => {
                return Err(ProtocolError::MalformedValue(
                    "array/map values are not valid WAL parameters".to_string(),
                ))
            }
        })
    }

    /// Converts this wire form back to a [`Value`].
    pub fn to_value(&self) -> ProtocolResult<Value> {
        Ok(match self {
            Self::Null => Value::Null,
            Self::Bool { value } => Value::Bool(*value),
            Self::Int { value } => Value::Integer(*value),
            Self::Float { value } => Value::Float(*value),
            Self::String { value } => Value::Text(value.clone()),
            Self::Bytes { value } => Value::Bytes(decode_hex(value)?),
        })
    }
}

/// A WAL entry on the wire (spec.md §6): `{position, sql, params, timestamp,
/// prevHash, hash}`, with `prevHash`/`hash` rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalEntryWire {
    /// Per-database monotonic position, starting at 1.
    pub position: u64,
    /// SQL text.
    pub sql: String,
    /// Positional parameters.
    pub params: Vec<ParamWire>,
    /// Wall-clock milliseconds at commit time.
    pub timestamp: u64,
    /// Hex encoding of the predecessor entry's hash.
    pub prev_hash: String,
    /// Hex encoding of this entry's hash.
    pub hash: String,
}

impl WalEntryWire {
    /// Renders a [`WalEntry`] for the wire.
    pub fn from_entry(entry: &WalEntry) -> ProtocolResult<Self> {
        Ok(Self {
            position: entry.position,
            sql: entry.sql.clone(),
            params: entry
                .params
                .iter()
                .map(ParamWire::from_value)
                .collect::<ProtocolResult<Vec<_>>>()?,
            timestamp: entry.timestamp,
            prev_hash: encode_hex(&entry.prev_hash),
            hash: encode_hex(&entry.hash),
        })
    }

    /// Parses this wire entry back into a [`WalEntry`].
    ///
    /// The `hash` field is trusted as claimed, not recomputed here — a
    /// replica recomputes and compares it against its own chain tip in
    /// [`node_core::Database::apply_wal_entry`], which is where a forged or
    /// corrupted chain is actually caught.
    pub fn to_entry(&self) -> ProtocolResult<WalEntry> {
        let params = self
            .params
            .iter()
            .map(ParamWire::to_value)
            .collect::<ProtocolResult<Vec<_>>>()?;
        Ok(WalEntry {
            position: self.position,
            sql: self.sql.clone(),
            params,
            timestamp: self.timestamp,
            prev_hash: decode_hash(&self.prev_hash)?,
            hash: decode_hash(&self.hash)?,
        })
    }
}

/// Request to read a window of a database's WAL (`GET /wal`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    /// The database to read from.
    pub database_id: DatabaseId,
    /// First position to return, inclusive.
    pub from_position: u64,
    /// Maximum number of entries to return.
    pub limit: usize,
}

/// Response to a [`PullRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    /// Entries found, dense and strictly increasing in position.
    pub entries: Vec<WalEntryWire>,
    /// The latest committed position at read time.
    pub current_position: u64,
}

/// Request to apply pulled entries to a replica (`POST /wal/apply`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    /// The database to apply entries to.
    pub database_id: DatabaseId,
    /// Entries to apply, in position order.
    pub entries: Vec<WalEntryWire>,
}

/// Response to an [`ApplyRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    /// Number of entries actually applied (excludes already-applied ones).
    pub accepted: u64,
    /// The database's WAL position after applying.
    pub new_position: u64,
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn decode_hex(s: &str) -> ProtocolResult<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(ProtocolError::MalformedHash(s.to_string()));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ProtocolError::MalformedHash(s.to_string())))
        .collect()
}

/// Width in bytes of a hash field on the wire (32, for SHA-256; spec.md §9).
const HASH_WIDTH: usize = 32;

fn decode_hash(s: &str) -> ProtocolResult<[u8; HASH_WIDTH]> {
    let bytes = decode_hex(s)?;
    bytes
        .try_into()
        .map_err(|_| ProtocolError::MalformedHash(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> WalEntry {
        WalEntry::new(
            1,
            "INSERT INTO t VALUES (?)".to_string(),
            vec![Value::Integer(7), Value::Bytes(vec![0xca, 0xfe]), Value::Float(1.5)],
            1000,
            [0u8; HASH_WIDTH],
        )
        .unwrap()
    }

    #[test]
    fn entry_round_trips_through_wire() {
        let entry = sample_entry();
        let wire = WalEntryWire::from_entry(&entry).unwrap();
        let back = wire.to_entry().unwrap();
        assert_eq!(entry, back);
    }

    #[test]
    fn int_and_float_params_stay_distinct() {
        let wire = ParamWire::from_value(&Value::Integer(2)).unwrap();
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["type"], "int");
        let back = wire.to_value().unwrap();
        assert_eq!(back, Value::Integer(2));

        let wire_f = ParamWire::from_value(&Value::Float(2.0)).unwrap();
        assert_eq!(wire_f.to_value().unwrap(), Value::Float(2.0));
    }

    #[test]
    fn bytes_are_hex_encoded_and_distinct_from_text() {
        let wire = ParamWire::from_value(&Value::Bytes(vec![0xde, 0xad])).unwrap();
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json, serde_json::json!({"type": "bytes", "value": "dead"}));
        assert_eq!(wire.to_value().unwrap(), Value::Bytes(vec![0xde, 0xad]));
    }

    #[test]
    fn malformed_hash_is_rejected() {
        assert!(decode_hash("zz").is_err());
        assert!(decode_hash("ab").is_err()); // wrong width
    }
}
