//! Test fixtures and node/database helpers.
//!
//! Provides convenience functions for setting up test nodes and common
//! test scenarios.

use std::path::PathBuf;
use std::sync::Arc;

use node_codec::Value;
use node_core::{
    CreateDatabaseRequest, DatabaseId, EncryptionMode, ExecuteRequest, Node, NodeConfig,
    ReplicationPolicy,
};
use tempfile::TempDir;

/// A node with automatic temp-dir cleanup.
pub struct TestNode {
    /// The node instance.
    pub node: Arc<Node>,
    /// The temporary directory (kept alive to prevent cleanup), `None` for
    /// a fully in-memory node.
    _temp_dir: Option<TempDir>,
}

impl TestNode {
    /// Creates a new fully in-memory node (nothing persists across drops).
    #[must_use]
    pub fn memory() -> Self {
        let node = Arc::new(Node::new(NodeConfig::new()));
        node.start();
        Self { node, _temp_dir: None }
    }

    /// Creates a new node backed by a fresh temp directory.
    #[must_use]
    pub fn file() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp directory");
        let config = NodeConfig::new().data_dir(temp_dir.path().to_path_buf());
        let node = Arc::new(Node::new(config));
        node.discover_databases().expect("failed to discover databases");
        node.start();
        Self { node, _temp_dir: Some(temp_dir) }
    }

    /// Reopens a file-backed node at the same data directory, simulating a
    /// restart. Panics if this node is in-memory.
    #[must_use]
    pub fn reopen(self) -> Self {
        let temp_dir = self._temp_dir.expect("reopen requires a file-backed node");
        let config = NodeConfig::new().data_dir(temp_dir.path().to_path_buf());
        let node = Arc::new(Node::with_id(config, self.node.id()));
        node.discover_databases().expect("failed to discover databases");
        node.start();
        Self { node, _temp_dir: Some(temp_dir) }
    }

    /// This node's data directory, if file-backed.
    #[must_use]
    pub fn data_dir(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().to_path_buf())
    }

    /// Creates an unencrypted database with the given name/schema.
    pub fn create_database(&self, name: &str, schema: &str) -> DatabaseId {
        self.node
            .create_database(CreateDatabaseRequest {
                name: name.to_string(),
                schema: schema.to_string(),
                encryption_mode: EncryptionMode::None,
                replication: ReplicationPolicy::default(),
            })
            .expect("failed to create database")
    }

    /// Executes one statement with no parameters, panicking on failure.
    pub fn exec(&self, database_id: DatabaseId, sql: &str) {
        self.node
            .execute(ExecuteRequest {
                database_id,
                sql: sql.to_string(),
                params: vec![],
                required_wal_position: None,
            })
            .unwrap_or_else(|err| panic!("statement {sql:?} failed: {err}"));
    }
}

impl std::ops::Deref for TestNode {
    type Target = Node;

    fn deref(&self) -> &Self::Target {
        &self.node
    }
}

/// Runs `f` against a fresh in-memory node.
pub fn with_memory_node<F, R>(f: F) -> R
where
    F: FnOnce(&TestNode) -> R,
{
    f(&TestNode::memory())
}

/// Runs `f` against a fresh file-backed node, returning the node's temp
/// directory alongside the callback's result.
pub fn with_file_node<F, R>(f: F) -> R
where
    F: FnOnce(&TestNode) -> R,
{
    f(&TestNode::file())
}

/// Prebuilt scenarios for tests that just need populated data, not setup
/// code.
pub mod scenarios {
    use super::*;

    /// A node with one database containing `row_count` integer rows.
    #[must_use]
    pub fn populated_database(row_count: u64) -> (TestNode, DatabaseId) {
        let node = TestNode::memory();
        let id = node.create_database("bench", "CREATE TABLE items (v INTEGER)");
        for i in 0..row_count {
            node.node
                .execute(ExecuteRequest {
                    database_id: id,
                    sql: "INSERT INTO items VALUES (?1)".to_string(),
                    params: vec![Value::Integer(i as i64)],
                    required_wal_position: None,
                })
                .expect("failed to insert row");
        }
        (node, id)
    }

    /// A node hosting `database_count` independent, empty databases.
    #[must_use]
    pub fn multi_database_node(database_count: usize) -> (TestNode, Vec<DatabaseId>) {
        let node = TestNode::memory();
        let mut ids = Vec::with_capacity(database_count);
        for i in 0..database_count {
            let id = node.create_database(&format!("db_{i}"), "CREATE TABLE t (v INTEGER)");
            ids.push(id);
        }
        (node, ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_node_executes_statements() {
        let node = TestNode::memory();
        let id = node.create_database("test", "CREATE TABLE t (v INTEGER)");
        node.exec(id, "INSERT INTO t VALUES (1)");
        assert_eq!(node.node.current_wal_position(id).unwrap(), 2);
    }

    #[test]
    fn populated_scenario_has_requested_rows() {
        let (node, id) = scenarios::populated_database(10);
        let resp = node
            .node
            .execute(ExecuteRequest {
                database_id: id,
                sql: "SELECT COUNT(*) FROM items".to_string(),
                params: vec![],
                required_wal_position: None,
            })
            .unwrap();
        assert_eq!(resp.result.rows[0][0], Value::Integer(10));
    }

    #[test]
    fn file_node_survives_reopen() {
        let node = TestNode::file();
        let id = node.create_database("persisted", "CREATE TABLE t (v INTEGER)");
        node.exec(id, "INSERT INTO t VALUES (7)");

        let reopened = node.reopen();
        assert_eq!(reopened.node.list_databases().len(), 1);
        assert_eq!(reopened.node.current_wal_position(id).unwrap(), 2);
    }
}
