//! Node facade (spec.md §4.4): composes the Database Manager and exposes
//! the externally visible operations used by the HTTP adapter, the relay
//! store, the rate limiter, and the replication coordinator.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::broadcast;

use crate::config::NodeConfig;
use crate::database::Database;
use crate::error::{NodeError, NodeResult};
use crate::executor::QueryResult;
use crate::manager::{CreateDatabaseRequest, DatabaseInfo, DatabaseManager};
use crate::types::{DatabaseId, NodeId, NodeStatus};
use crate::wal::{ApplyOutcome, WalEntry};
use node_codec::Value;

/// Lifecycle and mutation events the node publishes. Delivery is
/// at-least-once within this process (spec.md §4.4); a lagging subscriber
/// observes a gap via [`broadcast::error::RecvError::Lagged`].
#[derive(Debug, Clone)]
pub enum NodeEvent {
    /// This node finished constructing its identity.
    NodeRegistered {
        /// This node's id.
        node_id: NodeId,
    },
    /// A database was created.
    DatabaseCreated {
        /// The new database's id.
        database_id: DatabaseId,
        /// Its name.
        name: String,
    },
    /// A database was deleted.
    DatabaseDeleted {
        /// The deleted database's id.
        database_id: DatabaseId,
    },
    /// A WAL entry was committed.
    WalAppended {
        /// The database it was appended to.
        database_id: DatabaseId,
        /// The entry's position.
        position: u64,
    },
}

/// Request to [`Node::execute`].
pub struct ExecuteRequest {
    /// Target database.
    pub database_id: DatabaseId,
    /// SQL text.
    pub sql: String,
    /// Positional parameters.
    pub params: Vec<Value>,
    /// If set, the request fails with [`NodeError::NodeBehind`] until the
    /// local WAL position reaches this value (read-your-writes).
    pub required_wal_position: Option<u64>,
}

/// Response from [`Node::execute`].
#[derive(Debug, Clone)]
pub struct ExecuteResponse {
    /// The query result.
    pub result: QueryResult,
    /// The database's WAL position after this call.
    pub wal_position: u64,
}

/// A window of WAL entries plus the position they were read at.
#[derive(Debug, Clone)]
pub struct WalRange {
    /// The entries found, dense and strictly increasing in position.
    pub entries: Vec<WalEntry>,
    /// The latest committed position at read time.
    pub current_position: u64,
}

/// Outcome of [`Node::apply_wal_entries`].
#[derive(Debug, Clone)]
pub struct ApplyResult {
    /// Number of entries actually applied (excludes already-applied ones).
    pub accepted: u64,
    /// The database's WAL position after applying.
    pub new_position: u64,
}

const STATUS_PENDING: u8 = 0;
const STATUS_ACTIVE: u8 = 1;
const STATUS_EXITING: u8 = 2;

/// Top-level facade wrapping the SQL Executor, WAL Engine, and Database
/// Manager, per spec.md §4.4.
pub struct Node {
    id: NodeId,
    config: NodeConfig,
    databases: DatabaseManager,
    status: AtomicU8,
    events: broadcast::Sender<NodeEvent>,
    started_at: std::sync::OnceLock<Instant>,
}

impl Node {
    /// Constructs a node with a freshly generated identity. Status starts
    /// `Pending`; call [`Node::start`] to transition to `Active`.
    #[must_use]
    pub fn new(config: NodeConfig) -> Self {
        Self::with_id(config, NodeId::new())
    }

    /// Constructs a node with a caller-supplied identity, for a restarting
    /// process that read its id back from `<data_dir>/node.json` (spec.md
    /// §6) rather than generating a new one.
    #[must_use]
    pub fn with_id(config: NodeConfig, id: NodeId) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            id,
            databases: DatabaseManager::new(config.data_dir.clone(), config.sync_on_commit),
            config,
            status: AtomicU8::new(STATUS_PENDING),
            events,
            started_at: std::sync::OnceLock::new(),
        }
    }

    /// This node's identity.
    #[must_use]
    pub const fn id(&self) -> NodeId {
        self.id
    }

    /// This node's configuration.
    #[must_use]
    pub const fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> NodeStatus {
        match self.status.load(Ordering::SeqCst) {
            STATUS_ACTIVE => NodeStatus::Active,
            STATUS_EXITING => NodeStatus::Exiting,
            _ => NodeStatus::Pending,
        }
    }

    /// Seconds since [`Node::start`] was called, or 0 if not yet started.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at
            .get()
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }

    /// Transitions `pending -> active` and emits `node:registered`.
    pub fn start(&self) {
        self.status.store(STATUS_ACTIVE, Ordering::SeqCst);
        let _ = self.started_at.set(Instant::now());
        self.emit(NodeEvent::NodeRegistered { node_id: self.id });
    }

    /// Transitions `active -> exiting`. Callers (the HTTP adapter, the
    /// replication pull loops) observe this via [`Node::status`] at their
    /// next suspension point and stop accepting new work.
    pub fn stop(&self) {
        self.status.store(STATUS_EXITING, Ordering::SeqCst);
    }

    /// Subscribes to lifecycle/mutation events.
    #[must_use]
    pub fn on_event(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: NodeEvent) {
        let _ = self.events.send(event);
    }

    /// Creates a database.
    pub fn create_database(&self, req: CreateDatabaseRequest) -> NodeResult<DatabaseId> {
        let name = req.name.clone();
        let db = self.databases.create(req)?;
        let id = db.id();
        self.emit(NodeEvent::DatabaseCreated { database_id: id, name });
        Ok(id)
    }

    /// Deletes a database.
    pub fn delete_database(&self, id: DatabaseId) -> NodeResult<()> {
        self.databases.delete(id)?;
        self.emit(NodeEvent::DatabaseDeleted { database_id: id });
        Ok(())
    }

    /// Looks up a database's summary info.
    pub fn get_database(&self, id: DatabaseId) -> NodeResult<DatabaseInfo> {
        let db = self.databases.get(id)?;
        Ok(DatabaseInfo {
            id: db.id(),
            name: db.name().to_string(),
            encryption_mode: db.encryption_mode(),
            role: db.role(),
            wal_position: db.wal_position(),
            created_at: db.created_at(),
        })
    }

    /// Lists every database on this node.
    #[must_use]
    pub fn list_databases(&self) -> Vec<DatabaseInfo> {
        self.databases.list()
    }

    fn database(&self, id: DatabaseId) -> NodeResult<Arc<Database>> {
        self.databases.get(id)
    }

    /// Executes one statement against a database (spec.md §4.4).
    pub fn execute(&self, req: ExecuteRequest) -> NodeResult<ExecuteResponse> {
        let db = self.database(req.database_id)?;

        if let Some(required) = req.required_wal_position {
            let current = db.wal_position();
            if current < required {
                return Err(NodeError::NodeBehind { required, current });
            }
        }

        let (result, entry) = db.execute(&req.sql, &req.params)?;
        if let Some(entry) = entry {
            self.emit(NodeEvent::WalAppended {
                database_id: req.database_id,
                position: entry.position,
            });
        }
        Ok(ExecuteResponse {
            result,
            wal_position: db.wal_position(),
        })
    }

    /// Executes a batch of statements against a database.
    pub fn batch_execute(
        &self,
        database_id: DatabaseId,
        queries: Vec<(String, Vec<Value>)>,
        transactional: bool,
    ) -> NodeResult<Vec<QueryResult>> {
        let db = self.database(database_id)?;
        let position_before = db.wal_position();
        let results = db.execute_batch(&queries, transactional)?;
        let position_after = db.wal_position();
        if position_after > position_before {
            self.emit(NodeEvent::WalAppended {
                database_id,
                position: position_after,
            });
        }
        Ok(results)
    }

    /// Serves a WAL range read — the primary half of replication.
    pub fn get_wal_entries(
        &self,
        database_id: DatabaseId,
        from_position: u64,
        limit: usize,
    ) -> NodeResult<WalRange> {
        let db = self.database(database_id)?;
        let limit = limit.min(self.config.max_wal_range).max(1);
        let (entries, current_position) = db.read_wal_range(from_position, limit)?;
        Ok(WalRange {
            entries,
            current_position,
        })
    }

    /// Applies pulled WAL entries to a replica database — the replica half
    /// of replication. Entries must be supplied in position order; a
    /// [`NodeError::HashChainBroken`] aborts the whole call, leaving
    /// earlier entries in this call already applied (idempotent on retry).
    pub fn apply_wal_entries(&self, database_id: DatabaseId, entries: &[WalEntry]) -> NodeResult<ApplyResult> {
        let db = self.database(database_id)?;
        let mut accepted = 0u64;
        for entry in entries {
            match db.apply_wal_entry(entry)? {
                ApplyOutcome::Applied => {
                    accepted += 1;
                    self.emit(NodeEvent::WalAppended {
                        database_id,
                        position: entry.position,
                    });
                }
                ApplyOutcome::AlreadyApplied | ApplyOutcome::Gap => {}
            }
        }
        Ok(ApplyResult {
            accepted,
            new_position: db.wal_position(),
        })
    }

    /// The current WAL position of a database.
    pub fn current_wal_position(&self, database_id: DatabaseId) -> NodeResult<u64> {
        self.databases.current_wal_position(database_id)
    }

    /// Reopens every database this node hosted before a restart, by
    /// scanning `<data_dir>/databases/*` for `meta.json` sidecars. Callers
    /// that persist to disk (the CLI's `serve`/`db` commands) should call
    /// this once right after [`Node::new`] and before [`Node::start`].
    /// Returns how many databases were newly discovered.
    pub fn discover_databases(&self) -> NodeResult<usize> {
        self.databases.discover()
    }
}
