//! Bridging between the internal [`Value`] union and `serde_json::Value`.
//!
//! The WAL hash chain and SQL parameter binding use [`Value`]'s canonical
//! encoding; the node's HTTP surface (spec.md §6) carries JSON bodies.
//! These conversions let the HTTP adapter and replication wire types stay
//! JSON-shaped without leaking JSON's looser number model (one numeric type,
//! no byte strings) into the WAL's canonical encoding.

use serde_json::{Map, Number};

use crate::error::{CodecError, CodecResult};
use crate::value::Value;

/// Converts a [`Value`] to its JSON rendering.
///
/// `Bytes` has no native JSON representation, so it is rendered as a
/// lowercase hex string; [`json_to_value`] only reverses this when told to
/// expect bytes (it otherwise treats hex-looking strings as plain text),
/// so this conversion is one-way for byte-string round trips through
/// untyped JSON.
#[must_use]
pub fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(hex::encode(b)),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(value_to_json).collect()),
        Value::Map(pairs) => {
            let mut map = Map::with_capacity(pairs.len());
            for (k, v) in pairs {
                let key = k.as_text().map(str::to_string).unwrap_or_else(|| format!("{k:?}"));
                map.insert(key, value_to_json(v));
            }
            serde_json::Value::Object(map)
        }
    }
}

/// Converts a JSON value into the closed [`Value`] union.
///
/// Numbers without a fraction or exponent become `Integer`; everything else
/// numeric becomes `Float`. JSON has no byte-string type, so a JSON string
/// always becomes `Value::Text` — callers that need `Value::Bytes` (e.g. a
/// `WAL entry`'s binary params) must decode it explicitly from the intended
/// field.
pub fn json_to_value(json: &serde_json::Value) -> CodecResult<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                return Err(CodecError::IntegerOverflow);
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Array(items.iter().map(json_to_value).collect::<CodecResult<_>>()?)
        }
        serde_json::Value::Object(map) => Value::map(
            map.iter()
                .map(|(k, v)| Ok((Value::Text(k.clone()), json_to_value(v)?)))
                .collect::<CodecResult<Vec<_>>>()?,
        ),
    })
}

mod hex {
    pub fn encode(bytes: &[u8]) -> String {
        use std::fmt::Write;
        let mut out = String::with_capacity(bytes.len() * 2);
        for b in bytes {
            let _ = write!(out, "{b:02x}");
        }
        out
    }
}
