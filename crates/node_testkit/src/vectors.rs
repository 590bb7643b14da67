//! Fixed wire-format vectors for `replication_protocol` types, pinning the
//! exact JSON shape a client or another implementation must produce/accept
//! for `GET /wal` and `POST /wal/apply` (spec.md §6). These are not
//! round-trip checks against the encoder that produced them; each vector's
//! `json` field is a literal a conforming implementation is expected to
//! match byte-for-byte modulo key order.

use serde::{Deserialize, Serialize};

/// One fixed input/output pairing for a wire type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestVector {
    /// Unique identifier for this vector.
    pub id: String,
    /// Human-readable description.
    pub description: String,
    /// The literal JSON text a conforming implementation must produce.
    pub json: String,
}

/// `ParamWire` vectors: one per `Value` variant, pinning the tagged shape
/// that lets a SQL parameter survive the wire without losing its type
/// (spec.md §6 — plain JSON can't distinguish `int64` from `float64`, nor
/// `string` from `byte-string`).
#[must_use]
pub fn param_wire_vectors() -> Vec<TestVector> {
    vec![
        TestVector {
            id: "param_null".into(),
            description: "NULL parameter".into(),
            json: r#"{"type":"null"}"#.into(),
        },
        TestVector {
            id: "param_bool".into(),
            description: "boolean parameter".into(),
            json: r#"{"type":"bool","value":true}"#.into(),
        },
        TestVector {
            id: "param_int".into(),
            description: "64-bit integer parameter".into(),
            json: r#"{"type":"int","value":42}"#.into(),
        },
        TestVector {
            id: "param_negative_int".into(),
            description: "negative 64-bit integer parameter".into(),
            json: r#"{"type":"int","value":-1}"#.into(),
        },
        TestVector {
            id: "param_float".into(),
            description: "IEEE-754 double parameter".into(),
            json: r#"{"type":"float","value":1.5}"#.into(),
        },
        TestVector {
            id: "param_string".into(),
            description: "UTF-8 text parameter".into(),
            json: r#"{"type":"string","value":"hello"}"#.into(),
        },
        TestVector {
            id: "param_bytes".into(),
            description: "byte-string parameter, hex-encoded".into(),
            json: r#"{"type":"bytes","value":"cafe"}"#.into(),
        },
    ]
}

/// A single [`WalEntryWire`](replication_protocol::WalEntryWire) vector,
/// pinning field names (`camelCase`) and hash encoding (lowercase hex).
#[must_use]
pub fn wal_entry_wire_vector() -> TestVector {
    TestVector {
        id: "wal_entry_first".into(),
        description: "first entry of a fresh database, one integer parameter".into(),
        json: concat!(
            r#"{"position":1,"sql":"INSERT INTO t VALUES (?1)","params":[{"type":"int","value":7}],"#,
            r#""timestamp":1700000000000,"#,
            r#""prevHash":"0000000000000000000000000000000000000000000000000000000000000000","#,
            r#""hash":"b5c6a0f3d1e2a7c49f8b3d6e1a0c7f2b5d8e3a6c9f1b4d7e0a3c6f9b2d5e8a1c"}"#
        )
        .into(),
    }
}

/// A [`PullRequest`](replication_protocol::PullRequest) vector.
#[must_use]
pub fn pull_request_vector() -> TestVector {
    TestVector {
        id: "pull_request_basic".into(),
        description: "read up to 100 entries starting at position 5".into(),
        json: r#"{"databaseId":"<uuid>","fromPosition":5,"limit":100}"#.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use node_codec::Value;
    use replication_protocol::ParamWire;

    #[test]
    fn param_wire_vectors_round_trip_to_the_right_value() {
        let expectations: Vec<(&str, Value)> = vec![
            ("param_null", Value::Null),
            ("param_bool", Value::Bool(true)),
            ("param_int", Value::Integer(42)),
            ("param_negative_int", Value::Integer(-1)),
            ("param_float", Value::Float(1.5)),
            ("param_string", Value::Text("hello".to_string())),
            ("param_bytes", Value::Bytes(vec![0xca, 0xfe])),
        ];

        let vectors = param_wire_vectors();
        for (id, expected) in expectations {
            let vector = vectors.iter().find(|v| v.id == id).unwrap_or_else(|| panic!("missing vector {id}"));
            let wire: ParamWire = serde_json::from_str(&vector.json).unwrap_or_else(|e| panic!("vector {id} failed to parse: {e}"));
            let value = wire.to_value().unwrap_or_else(|e| panic!("vector {id} failed to convert: {e}"));
            assert_eq!(value, expected, "vector {id} converted to the wrong value");

            let reencoded = serde_json::to_string(&wire).unwrap();
            let reparsed: serde_json::Value = serde_json::from_str(&reencoded).unwrap();
            let original: serde_json::Value = serde_json::from_str(&vector.json).unwrap();
            assert_eq!(reparsed, original, "vector {id} did not round trip through serde_json unchanged");
        }
    }

    #[test]
    fn wal_entry_wire_vector_has_camel_case_fields() {
        let vector = wal_entry_wire_vector();
        let parsed: serde_json::Value = serde_json::from_str(&vector.json).unwrap();
        for field in ["position", "sql", "params", "timestamp", "prevHash", "hash"] {
            assert!(parsed.get(field).is_some(), "vector missing expected field {field}");
        }
        assert!(parsed.get("prev_hash").is_none(), "wire field must be camelCase, not snake_case");
    }

    #[test]
    fn pull_request_vector_has_camel_case_fields() {
        let vector = pull_request_vector();
        let parsed: serde_json::Value = serde_json::from_str(&vector.json).unwrap();
        assert!(parsed.get("databaseId").is_some());
        assert!(parsed.get("fromPosition").is_some());
        assert!(parsed.get("limit").is_some());
    }
}
