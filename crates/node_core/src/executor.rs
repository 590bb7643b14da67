//! SQL Executor (spec.md §4.1): runs a SQL string with positional
//! parameters against one database's embedded `rusqlite::Connection`,
//! classifying read-only vs mutating via the engine's own prepare-step
//! introspection rather than string prefix inspection.

use node_codec::Value;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;

use crate::error::NodeResult;

/// The result of one statement execution.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    /// Column names, empty for mutating statements.
    pub columns: Vec<String>,
    /// Result rows, empty for mutating statements.
    pub rows: Vec<Vec<Value>>,
    /// Number of rows changed by a mutating statement.
    pub rows_affected: u64,
    /// `ROWID` of the last inserted row, if any.
    pub last_insert_id: i64,
    /// Whether the engine classified this statement as read-only.
    pub read_only: bool,
}

/// Converts a node_codec [`Value`] to the closed union rusqlite binds.
pub fn value_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::Text(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
        Value::Array(_) | Value::Map(_) => {
            // Not part of the wire value union (spec.md §6); callers never
            // construct these as SQL parameters. Fall back to NULL rather
            // than panicking on a closed-union violation.
            SqlValue::Null
        }
    }
}

/// Converts a rusqlite column value back to a node_codec [`Value`].
pub fn sql_to_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

/// Determines whether `sql`, once prepared, is a read-only statement. Uses
/// `rusqlite::Statement::readonly`, which asks SQLite's own query planner —
/// not a `SELECT` string prefix check, which `EXPLAIN`, CTEs, and
/// `pragma`-backed reads would all defeat.
pub fn is_readonly(conn: &Connection, sql: &str) -> NodeResult<bool> {
    let stmt = conn.prepare(sql)?;
    Ok(stmt.readonly())
}

/// Runs a read-only statement to completion, collecting all rows.
pub fn run_read(conn: &Connection, sql: &str, params: &[Value]) -> NodeResult<QueryResult> {
    let mut stmt = conn.prepare(sql)?;
    let binds: Vec<SqlValue> = params.iter().map(value_to_sql).collect();
    let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
    let column_count = columns.len();

    let rows = stmt
        .query_map(rusqlite::params_from_iter(binds.iter()), |row| {
            let mut out = Vec::with_capacity(column_count);
            for idx in 0..column_count {
                out.push(sql_to_value(row.get_ref(idx)?));
            }
            Ok(out)
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(QueryResult {
        columns,
        rows,
        rows_affected: 0,
        last_insert_id: 0,
        read_only: true,
    })
}

/// Runs a mutating statement, returning rows-affected and the last insert
/// rowid. The caller is responsible for wrapping this in a transaction that
/// also covers the WAL append, per spec.md §4.2's atomicity requirement.
pub fn run_write(conn: &Connection, sql: &str, params: &[Value]) -> NodeResult<QueryResult> {
    let binds: Vec<SqlValue> = params.iter().map(value_to_sql).collect();
    let rows_affected = conn.execute(sql, rusqlite::params_from_iter(binds.iter()))?;
    Ok(QueryResult {
        columns: Vec::new(),
        rows: Vec::new(),
        rows_affected: rows_affected as u64,
        last_insert_id: conn.last_insert_rowid(),
        read_only: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn classifies_select_as_readonly() {
        let c = conn();
        c.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
        assert!(is_readonly(&c, "SELECT * FROM t").unwrap());
        assert!(!is_readonly(&c, "INSERT INTO t VALUES (1)").unwrap());
    }

    #[test]
    fn run_write_reports_rows_affected_and_last_insert_id() {
        let c = conn();
        c.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .unwrap();
        let result = run_write(
            &c,
            "INSERT INTO t (name) VALUES (?)",
            &[Value::Text("alice".into())],
        )
        .unwrap();
        assert_eq!(result.rows_affected, 1);
        assert_eq!(result.last_insert_id, 1);
        assert!(!result.read_only);
    }

    #[test]
    fn run_read_collects_typed_rows() {
        let c = conn();
        c.execute_batch("CREATE TABLE t (id INTEGER, name TEXT, score REAL, flag INTEGER, blob BLOB)")
            .unwrap();
        run_write(
            &c,
            "INSERT INTO t VALUES (1, 'bob', 2.5, 1, X'CAFE')",
            &[],
        )
        .unwrap();

        let result = run_read(&c, "SELECT id, name, score, flag, blob FROM t", &[]).unwrap();
        assert_eq!(result.columns, vec!["id", "name", "score", "flag", "blob"]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(
            result.rows[0],
            vec![
                Value::Integer(1),
                Value::Text("bob".into()),
                Value::Float(2.5),
                Value::Integer(1),
                Value::Bytes(vec![0xCA, 0xFE]),
            ]
        );
    }

    #[test]
    fn value_conversion_is_closed_union() {
        for v in [
            Value::Null,
            Value::Bool(true),
            Value::Integer(7),
            Value::Float(1.5),
            Value::Text("x".into()),
            Value::Bytes(vec![1, 2]),
        ] {
            let _ = value_to_sql(&v);
        }
    }
}
