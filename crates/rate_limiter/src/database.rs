//! Database-backed rate-limit store, for horizontal scaling across nodes
//! that share one node-hosted database (spec.md §4.7, §1).

use std::sync::Arc;

use node_codec::Value;
use node_core::{DatabaseId, ExecuteRequest, Node};

use crate::error::RateLimiterResult;
use crate::store::{RateLimitStore, WindowState};

/// DDL a caller must execute (as the database's `schema` at creation time,
/// or via a migration) before using [`DatabaseStore`].
pub const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS rate_limits (\
    key TEXT PRIMARY KEY, \
    count INTEGER NOT NULL, \
    reset_at INTEGER NOT NULL\
)";

/// A rate-limit store backed by a `node_core`-hosted database. `(count,
/// resetAt)` live in a single row per key; [`DatabaseStore::maybe_increment`]
/// performs the whole fixed-window algorithm (spec.md §4.7 steps 1–4) as one
/// transactional batch, so concurrent callers against the same node never
/// undercount a burst.
pub struct DatabaseStore {
    node: Arc<Node>,
    database_id: DatabaseId,
}

impl DatabaseStore {
    /// Wraps a database already provisioned with [`SCHEMA`].
    #[must_use]
    pub fn new(node: Arc<Node>, database_id: DatabaseId) -> Self {
        Self { node, database_id }
    }

    fn execute(&self, sql: &str, params: Vec<Value>) -> RateLimiterResult<node_core::QueryResult> {
        let response = self.node.execute(ExecuteRequest {
            database_id: self.database_id,
            sql: sql.to_string(),
            params,
            required_wal_position: None,
        })?;
        Ok(response.result)
    }
}

impl RateLimitStore for DatabaseStore {
    fn get(&self, key: &str) -> RateLimiterResult<Option<WindowState>> {
        let result = self.execute(
            "SELECT count, reset_at FROM rate_limits WHERE key = ?1",
            vec![Value::Text(key.to_string())],
        )?;
        Ok(result.rows.first().map(|row| row_to_state(row)))
    }

    fn set(&self, key: &str, state: WindowState) -> RateLimiterResult<()> {
        self.execute(
            "INSERT INTO rate_limits (key, count, reset_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET count = excluded.count, reset_at = excluded.reset_at",
            vec![
                Value::Text(key.to_string()),
                Value::Integer(state.count as i64),
                Value::Integer(state.reset_at as i64),
            ],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> RateLimiterResult<()> {
        self.execute(
            "DELETE FROM rate_limits WHERE key = ?1",
            vec![Value::Text(key.to_string())],
        )?;
        Ok(())
    }

    fn clear(&self) -> RateLimiterResult<()> {
        self.execute("DELETE FROM rate_limits", vec![])?;
        Ok(())
    }

    fn maybe_increment(&self, key: &str, now_ms: u64, window_ms: u64) -> RateLimiterResult<WindowState> {
        let new_reset_at = now_ms + window_ms;
        let upsert = (
            "INSERT INTO rate_limits (key, count, reset_at) VALUES (?1, 1, ?2) \
             ON CONFLICT(key) DO UPDATE SET \
               count = CASE WHEN reset_at < ?3 THEN 1 ELSE count + 1 END, \
               reset_at = CASE WHEN reset_at < ?3 THEN ?2 ELSE reset_at END"
                .to_string(),
            vec![
                Value::Text(key.to_string()),
                Value::Integer(new_reset_at as i64),
                Value::Integer(now_ms as i64),
            ],
        );
        let select = (
            "SELECT count, reset_at FROM rate_limits WHERE key = ?1".to_string(),
            vec![Value::Text(key.to_string())],
        );

        let mut results = self.node.batch_execute(self.database_id, vec![upsert, select], true)?;
        let select_result = results.pop().ok_or_else(|| {
            node_core::NodeError::internal("rate limiter upsert returned no select result")
        })?;
        let row = select_result.rows.first().ok_or_else(|| {
            node_core::NodeError::internal("rate limiter upsert did not persist a row")
        })?;
        Ok(row_to_state(row))
    }

    fn cleanup(&self, now_ms: u64) -> RateLimiterResult<u64> {
        let result = self.execute(
            "DELETE FROM rate_limits WHERE reset_at < ?1",
            vec![Value::Integer(now_ms as i64)],
        )?;
        Ok(result.rows_affected)
    }

    fn len(&self) -> RateLimiterResult<usize> {
        let result = self.execute("SELECT COUNT(*) FROM rate_limits", vec![])?;
        let count = match result.rows.first().and_then(|row| row.first()) {
            Some(Value::Integer(n)) => *n as usize,
            _ => 0,
        };
        Ok(count)
    }
}

fn row_to_state(row: &[Value]) -> WindowState {
    let count = match row.first() {
        Some(Value::Integer(n)) => *n as u64,
        _ => 0,
    };
    let reset_at = match row.get(1) {
        Some(Value::Integer(n)) => *n as u64,
        _ => 0,
    };
    WindowState { count, reset_at }
}
