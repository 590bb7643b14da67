//! Property-based generators for SQL parameter values and simple WAL
//! workloads, built on [`proptest`].

use node_codec::Value;
use proptest::prelude::*;

/// A scalar value: the variants that round-trip through SQL parameter
/// binding without needing a matching column type (excludes `Array`/`Map`,
/// which `replication_protocol::ParamWire` cannot represent either).
pub fn arb_scalar_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(Value::Float),
        ".*".prop_map(Value::Text),
        proptest::collection::vec(any::<u8>(), 0..64).prop_map(Value::Bytes),
    ]
}

/// A value that may recurse into arrays/maps, bounded in depth and size —
/// the full closed union the codec encodes, for exercising CBOR round trips.
pub fn arb_value() -> impl Strategy<Value = Value> {
    arb_scalar_value().prop_recursive(4, 64, 8, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            proptest::collection::vec((inner.clone(), inner), 0..8).prop_map(Value::map),
        ]
    })
}

/// A short list of scalar parameters, the shape a single `Database::execute`
/// call binds.
pub fn arb_param_list(max_len: usize) -> impl Strategy<Value = Vec<Value>> {
    proptest::collection::vec(arb_scalar_value(), 0..=max_len)
}

/// A valid SQL identifier: a letter followed by alphanumerics/underscores.
pub fn arb_identifier() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_]{0,15}".prop_map(|s| s)
}

/// A sequence of integers to insert one row at a time, for exercising the
/// WAL's dense-position / hash-chain invariants without a full SQL
/// statement generator.
pub fn arb_insert_batch(max_len: usize) -> impl Strategy<Value = Vec<i64>> {
    proptest::collection::vec(any::<i64>(), 0..=max_len)
}

/// A mix of reads and writes against a single-column integer table, as
/// `(is_write, value)` pairs — a write inserts `value`, a read ignores it.
/// Used to check that read-only statements never advance the WAL position.
pub fn arb_mixed_workload(max_len: usize) -> impl Strategy<Value = Vec<(bool, i64)>> {
    proptest::collection::vec((any::<bool>(), any::<i64>()), 0..=max_len)
}
