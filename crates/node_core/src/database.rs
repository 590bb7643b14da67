//! A single tenant database: one SQL connection pair plus one WAL.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use node_codec::Value;
use node_storage::{EncryptedBackend, FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};

use crate::error::{NodeError, NodeResult};
use crate::executor::{self, QueryResult};
use crate::types::{DatabaseId, DatabaseRole, EncryptionMode};
use crate::wal::{ApplyOutcome, WalEntry, WalManager};

/// On-disk sidecar next to `data.db`/`wal.log` (spec.md §6) carrying the
/// fields a restarting node needs to reopen a database without re-running
/// its schema: `Database::open` cannot recover `name`/`encryption_mode`/
/// `role` from `data.db` or `wal.log` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PersistedMeta {
    pub(crate) id: DatabaseId,
    pub(crate) name: String,
    encryption_mode: String,
    role: String,
    pub(crate) created_at: u64,
}

impl PersistedMeta {
    const FILE_NAME: &'static str = "meta.json";

    pub(crate) fn encryption_mode(&self) -> EncryptionMode {
        EncryptionMode::parse(&self.encryption_mode).unwrap_or_default()
    }

    pub(crate) fn role(&self) -> DatabaseRole {
        match self.role.as_str() {
            "replica" => DatabaseRole::Replica,
            _ => DatabaseRole::Primary,
        }
    }

    /// Reads `dir/meta.json`. [`NodeError::NotFound`] if absent, so
    /// callers scanning `databases/` can skip directories that aren't
    /// (yet) a fully provisioned database.
    pub(crate) fn read(dir: &std::path::Path) -> NodeResult<Self> {
        let path = dir.join(Self::FILE_NAME);
        let bytes = std::fs::read(&path)
            .map_err(|_| NodeError::not_found(format!("database metadata at {}", path.display())))?;
        serde_json::from_slice(&bytes).map_err(|err| NodeError::internal(format!("corrupt database metadata: {err}")))
    }

    fn write(&self, dir: &std::path::Path) -> NodeResult<()> {
        std::fs::create_dir_all(dir)?;
        let bytes = serde_json::to_vec_pretty(self).map_err(|err| NodeError::internal(format!("encoding database metadata: {err}")))?;
        std::fs::write(dir.join(Self::FILE_NAME), bytes)?;
        Ok(())
    }
}

/// Where a database's SQLite file and WAL log live.
#[derive(Debug, Clone)]
enum Location {
    /// `mode=memory&cache=shared` so every connection sees the same state.
    Memory { uri: String },
    /// On-disk `data.db` next to `wal.log`, per spec.md §6.
    File { data_db: PathBuf },
}

/// One independently provisioned, isolated relational store (spec.md §3).
pub struct Database {
    id: DatabaseId,
    name: String,
    role: Mutex<DatabaseRole>,
    encryption_mode: EncryptionMode,
    created_at: u64,
    location: Location,
    writer: Mutex<Connection>,
    wal: WalManager,
    wal_position: AtomicU64,
}

/// Parameters for opening/creating a [`Database`].
pub struct DatabaseSpec {
    /// The database's assigned id.
    pub id: DatabaseId,
    /// Human-readable name, unique within the node.
    pub name: String,
    /// Encryption posture.
    pub encryption_mode: EncryptionMode,
    /// Role at creation time; a database created locally starts `Primary`.
    pub role: DatabaseRole,
    /// `None` for an in-memory-only node; `Some(dir)` for a database whose
    /// files live under `dir` (`data.db`, `wal.log`).
    pub data_dir: Option<PathBuf>,
    /// Whether the WAL fsyncs after every append.
    pub sync_on_commit: bool,
    /// Encryption key for [`EncryptionMode::AtRest`] databases.
    pub encryption_key: Option<node_storage::EncryptionKey>,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl Database {
    /// Opens (creating if absent) a database's connection and WAL per
    /// `spec`.
    pub fn open(spec: DatabaseSpec) -> NodeResult<Self> {
        let location = match &spec.data_dir {
            None => Location::Memory {
                uri: format!("file:node-db-{}?mode=memory&cache=shared", spec.id),
            },
            Some(dir) => Location::File {
                data_db: dir.join("data.db"),
            },
        };

        let writer = open_connection(&location)?;

        let wal_backend: Box<dyn StorageBackend> = match &spec.data_dir {
            None => Box::new(InMemoryBackend::new()),
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let file: Box<dyn StorageBackend> =
                    Box::new(FileBackend::open_with_create_dirs(&dir.join("wal.log"))?);
                match (spec.encryption_mode, spec.encryption_key.clone()) {
                    (EncryptionMode::AtRest, Some(key)) => {
                        Box::new(EncryptedBackend::new(file, key)?)
                    }
                    _ => file,
                }
            }
        };
        let wal = WalManager::open(wal_backend, spec.sync_on_commit)?;
        let wal_position = AtomicU64::new(wal.current_position());

        let created_at = match &spec.data_dir {
            Some(dir) => match PersistedMeta::read(dir) {
                Ok(meta) => meta.created_at,
                Err(_) => now_ms(),
            },
            None => now_ms(),
        };

        let database = Self {
            id: spec.id,
            name: spec.name,
            role: Mutex::new(spec.role),
            encryption_mode: spec.encryption_mode,
            created_at,
            location,
            writer: Mutex::new(writer),
            wal,
            wal_position,
        };
        database.write_meta()?;
        Ok(database)
    }

    /// Directory this database's files live in, or `None` for an
    /// in-memory-only database (nothing to persist meta for).
    fn dir(&self) -> Option<std::path::PathBuf> {
        match &self.location {
            Location::Memory { .. } => None,
            Location::File { data_db } => data_db.parent().map(std::path::Path::to_path_buf),
        }
    }

    /// Writes (or refreshes) this database's `meta.json` sidecar, per
    /// spec.md §6's persisted state layout. A no-op for in-memory
    /// databases, which have nothing on disk to restart from.
    fn write_meta(&self) -> NodeResult<()> {
        let Some(dir) = self.dir() else { return Ok(()) };
        PersistedMeta {
            id: self.id,
            name: self.name.clone(),
            encryption_mode: self.encryption_mode.as_str().to_string(),
            role: self.role().as_str().to_string(),
            created_at: self.created_at,
        }
        .write(&dir)
    }

    /// Opens a fresh, independent connection suitable for concurrent reads
    /// (SQLite's WAL journal mode allows many readers alongside one
    /// writer); see spec.md §4.1's snapshot-isolation requirement.
    fn open_reader(&self) -> NodeResult<Connection> {
        open_connection(&self.location)
    }

    /// The database's id.
    #[must_use]
    pub const fn id(&self) -> DatabaseId {
        self.id
    }

    /// The database's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The database's current role.
    #[must_use]
    pub fn role(&self) -> DatabaseRole {
        *self.role.lock()
    }

    /// Switches this database's role (used when promoting/demoting during
    /// replication setup). Best-effort persisted to `meta.json` so a
    /// restarted node reopens the database in the role it last held; a
    /// failure to persist is logged, not propagated, since the role
    /// switch itself already took effect in memory.
    pub fn set_role(&self, role: DatabaseRole) {
        *self.role.lock() = role;
        if let Err(err) = self.write_meta() {
            tracing::warn!(database_id = %self.id, error = %err, "failed to persist role change");
        }
    }

    /// The database's encryption mode.
    #[must_use]
    pub const fn encryption_mode(&self) -> EncryptionMode {
        self.encryption_mode
    }

    /// Unix millis when this database was opened.
    #[must_use]
    pub const fn created_at(&self) -> u64 {
        self.created_at
    }

    /// The highest committed WAL position (0 if empty).
    #[must_use]
    pub fn wal_position(&self) -> u64 {
        self.wal_position.load(Ordering::SeqCst)
    }

    /// Executes `sql` with `params`. Classification (read-only vs
    /// mutating) comes from the engine's own prepare-step introspection.
    ///
    /// Mutating statements commit their SQL effect before the WAL entry is
    /// appended: the SQL mutation runs inside a SQLite transaction, and
    /// only once that transaction has durably committed is the
    /// corresponding entry written to the WAL. If the commit fails (e.g.
    /// the engine is full or busy), nothing is ever appended, so the chain
    /// never records a write SQLite rolled back.
    pub fn execute(&self, sql: &str, params: &[Value]) -> NodeResult<(QueryResult, Option<WalEntry>)> {
        let reader = self.open_reader()?;
        let readonly = executor::is_readonly(&reader, sql)?;

        if readonly {
            let result = executor::run_read(&reader, sql, params)?;
            return Ok((result, None));
        }

        let mut conn = self.writer.lock();
        let tx = conn.transaction().map_err(NodeError::from)?;
        let result = executor::run_write(&tx, sql, params)?;
        tx.commit().map_err(NodeError::from)?;
        let entry = self.wal.append(sql, params, now_ms())?;
        self.wal_position.store(entry.position, Ordering::SeqCst);
        Ok((result, Some(entry)))
    }

    /// Executes a sequence of statements. When `transactional`, all
    /// statements and their WAL entries commit together or not at all;
    /// otherwise each statement commits independently and a failure stops
    /// the batch without undoing earlier statements.
    pub fn execute_batch(
        &self,
        queries: &[(String, Vec<Value>)],
        transactional: bool,
    ) -> NodeResult<Vec<QueryResult>> {
        if !transactional {
            let mut out = Vec::with_capacity(queries.len());
            for (sql, params) in queries {
                let (result, _) = self.execute(sql, params)?;
                out.push(result);
            }
            return Ok(out);
        }

        let mut conn = self.writer.lock();
        let tx = conn.transaction().map_err(NodeError::from)?;
        let mut results = Vec::with_capacity(queries.len());
        let mut to_log = Vec::with_capacity(queries.len());

        for (sql, params) in queries {
            let readonly = executor::is_readonly(&tx, sql)?;
            if readonly {
                results.push(executor::run_read(&tx, sql, params)?);
                continue;
            }
            let result = executor::run_write(&tx, sql, params)?;
            results.push(result);
            to_log.push((sql.clone(), params.clone()));
        }

        tx.commit().map_err(NodeError::from)?;

        let mut entries = Vec::with_capacity(to_log.len());
        for (sql, params) in &to_log {
            entries.push(self.wal.append(sql, params, now_ms())?);
        }
        if let Some(last) = entries.last() {
            self.wal_position.store(last.position, Ordering::SeqCst);
        }
        Ok(results)
    }

    /// Reads WAL entries starting at `from_position` (inclusive), the
    /// primary half of the replication contract (spec.md §4.5).
    pub fn read_wal_range(&self, from_position: u64, limit: usize) -> NodeResult<(Vec<WalEntry>, u64)> {
        self.wal.read_range(from_position.max(1), limit)
    }

    /// Idempotently applies one replicated WAL entry, the replica half of
    /// the replication contract. Returns [`ApplyOutcome`] so the caller can
    /// drive its pull-loop state machine.
    pub fn apply_wal_entry(&self, entry: &WalEntry) -> NodeResult<ApplyOutcome> {
        let outcome = self.wal.apply_replicated(&self.id.to_string(), entry)?;
        if outcome == ApplyOutcome::Applied {
            let conn = self.writer.lock();
            conn.execute(
                &entry.sql,
                rusqlite::params_from_iter(entry.params.iter().map(executor::value_to_sql)),
            )
            .map_err(NodeError::from)?;
            self.wal_position.store(entry.position, Ordering::SeqCst);
        }
        Ok(outcome)
    }
}

fn open_connection(location: &Location) -> NodeResult<Connection> {
    let conn = match location {
        Location::Memory { uri } => Connection::open_with_flags(
            uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?,
        Location::File { data_db } => {
            let conn = Connection::open(data_db)?;
            conn.pragma_update(None, "journal_mode", "WAL")?;
            conn
        }
    };
    Ok(conn)
}
