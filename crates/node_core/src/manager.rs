//! Database Manager (spec.md §4.3): lifecycle of every database hosted on
//! this node.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::RwLock;

use crate::database::{Database, DatabaseSpec};
use crate::error::{NodeError, NodeResult};
use crate::types::{DatabaseId, DatabaseRole, EncryptionMode, ReplicationPolicy};

/// Request to create a new database.
pub struct CreateDatabaseRequest {
    /// Unique (within this node) display name.
    pub name: String,
    /// DDL executed as the database's first WAL entries.
    pub schema: String,
    /// Encryption posture.
    pub encryption_mode: EncryptionMode,
    /// Desired replication fan-out; inert at the Database Manager layer,
    /// consumed by whatever provisions replicas out-of-core.
    pub replication: ReplicationPolicy,
}

/// Summary view of a database, for `list`/`get`.
#[derive(Debug, Clone)]
pub struct DatabaseInfo {
    /// The database's id.
    pub id: DatabaseId,
    /// Its name.
    pub name: String,
    /// Its encryption posture.
    pub encryption_mode: EncryptionMode,
    /// Its replication role.
    pub role: DatabaseRole,
    /// Its current WAL position.
    pub wal_position: u64,
    /// Unix millis it was created/opened.
    pub created_at: u64,
}

/// Owns every [`Database`] hosted by this node and enforces the invariant
/// that a name is unique within the node.
pub struct DatabaseManager {
    data_dir: Option<PathBuf>,
    sync_on_commit: bool,
    by_id: RwLock<HashMap<DatabaseId, std::sync::Arc<Database>>>,
    name_to_id: RwLock<HashMap<String, DatabaseId>>,
}

impl DatabaseManager {
    /// Creates an empty manager rooted at `data_dir` (`None` for a fully
    /// in-memory node).
    #[must_use]
    pub fn new(data_dir: Option<PathBuf>, sync_on_commit: bool) -> Self {
        Self {
            data_dir,
            sync_on_commit,
            by_id: RwLock::new(HashMap::new()),
            name_to_id: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a database, running `schema` as its first WAL-logged DDL
    /// statements. Fails with [`NodeError::NameTaken`] if `name` is already
    /// used on this node.
    pub fn create(&self, req: CreateDatabaseRequest) -> NodeResult<std::sync::Arc<Database>> {
        {
            let names = self.name_to_id.read();
            if names.contains_key(&req.name) {
                return Err(NodeError::NameTaken { name: req.name });
            }
        }

        let id = DatabaseId::new();
        let db_dir = self.data_dir.as_ref().map(|root| root.join("databases").join(id.to_string()));

        let database = std::sync::Arc::new(Database::open(DatabaseSpec {
            id,
            name: req.name.clone(),
            encryption_mode: req.encryption_mode,
            role: DatabaseRole::Primary,
            data_dir: db_dir,
            sync_on_commit: self.sync_on_commit,
            encryption_key: None,
        })?);

        for statement in split_schema_statements(&req.schema) {
            database.execute(&statement, &[])?;
        }

        self.by_id.write().insert(id, database.clone());
        self.name_to_id.write().insert(req.name, id);
        Ok(database)
    }

    /// Looks up a database by id.
    pub fn get(&self, id: DatabaseId) -> NodeResult<std::sync::Arc<Database>> {
        self.by_id
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| NodeError::not_found(format!("database {id}")))
    }

    /// Lists every database's summary info.
    #[must_use]
    pub fn list(&self) -> Vec<DatabaseInfo> {
        self.by_id
            .read()
            .values()
            .map(|db| DatabaseInfo {
                id: db.id(),
                name: db.name().to_string(),
                encryption_mode: db.encryption_mode(),
                role: db.role(),
                wal_position: db.wal_position(),
                created_at: db.created_at(),
            })
            .collect()
    }

    /// Deletes a database and its on-disk files. Fails with
    /// [`NodeError::NotFound`] if absent.
    pub fn delete(&self, id: DatabaseId) -> NodeResult<()> {
        let database = self
            .by_id
            .write()
            .remove(&id)
            .ok_or_else(|| NodeError::not_found(format!("database {id}")))?;
        self.name_to_id.write().remove(database.name());

        if let Some(root) = &self.data_dir {
            let dir = root.join("databases").join(id.to_string());
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
        }
        Ok(())
    }

    /// The current WAL position of a database.
    pub fn current_wal_position(&self, id: DatabaseId) -> NodeResult<u64> {
        Ok(self.get(id)?.wal_position())
    }

    /// Scans `<data_dir>/databases/*` for directories carrying a
    /// `meta.json` sidecar and reopens each one not already held in this
    /// registry, so a restarted node resumes serving every database it
    /// hosted before it stopped (spec.md §6's persisted state layout only
    /// has meaning if a restart honors it). A no-op, returning `Ok(0)`,
    /// for an in-memory-only manager. Directories with no `meta.json`
    /// (partially provisioned, or foreign) are skipped rather than
    /// treated as an error.
    pub fn discover(&self) -> NodeResult<usize> {
        let Some(root) = &self.data_dir else { return Ok(0) };
        let databases_dir = root.join("databases");
        if !databases_dir.exists() {
            return Ok(0);
        }

        let mut found = 0;
        for entry in std::fs::read_dir(&databases_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir = entry.path();

            let meta = match crate::database::PersistedMeta::read(&dir) {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if self.by_id.read().contains_key(&meta.id) {
                continue;
            }

            let database = std::sync::Arc::new(Database::open(DatabaseSpec {
                id: meta.id,
                name: meta.name.clone(),
                encryption_mode: meta.encryption_mode(),
                role: meta.role(),
                data_dir: Some(dir),
                sync_on_commit: self.sync_on_commit,
                encryption_key: None,
            })?);

            self.by_id.write().insert(meta.id, database.clone());
            self.name_to_id.write().insert(meta.name, meta.id);
            found += 1;
        }
        Ok(found)
    }
}

/// Splits a schema blob into individual DDL statements so each enters the
/// WAL as its own entry, per spec.md §4.3 ("schema statements enter the log
/// as regular entries starting at position 1"). Naive `;`-splitting is
/// sufficient for DDL, which does not embed statement-terminating
/// semicolons inside string literals in practice for this engine's schema
/// inputs.
fn split_schema_statements(schema: &str) -> Vec<String> {
    schema
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
