//! # Node Core
//!
//! The embedded SQL engine at the heart of a node: per-database WAL,
//! SQLite-backed execution, and the Database Manager and Node facades that
//! the HTTP adapter, replication engine, and CLI build on.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Node                            │
//! │  (facade: execute, batch_execute, wal pull/push,     │
//! │   lifecycle, events)                                 │
//! └─────────────────────┬───────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────┐
//! │                DatabaseManager                        │
//! │  (create, get, list, delete; name uniqueness)        │
//! └─────────────────────┬───────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────┐
//! │                   Database                            │
//! │  (one rusqlite connection pair + one WAL)            │
//! └──────────┬──────────────────────────┬───────────────┘
//!            │                          │
//! ┌──────────▼──────────┐    ┌──────────▼───────────────┐
//! │    SQL Executor      │    │      WalManager           │
//! │  (read/write/classify)│    │  (hash-chained, framed)  │
//! └──────────────────────┘    └──────────┬───────────────┘
//!                                         │
//!                              ┌──────────▼───────────────┐
//!                              │   StorageBackend (trait)  │
//!                              │  (InMemory, File, Encrypted)│
//!                              └───────────────────────────┘
//! ```
//!
//! ## Key Invariants
//!
//! - **Dense WAL positions**: every committed mutation gets the next
//!   position, with no gaps, per database.
//! - **Hash-chained durability**: each entry commits to the hash of its
//!   predecessor; a broken chain is detected, never silently accepted.
//! - **Single writer, concurrent readers**: one write connection behind a
//!   lock; independent reader connections for genuine read concurrency.
//! - **Atomic WAL+SQL**: a mutation's SQL effect and its WAL entry commit
//!   together or not at all.
//! - **Idempotent apply**: replaying an already-applied WAL entry is a
//!   no-op, not an error.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
mod executor;
mod manager;
mod node;
mod types;
mod wal;

pub use config::NodeConfig;
pub use database::{Database, DatabaseSpec};
pub use error::{NodeError, NodeResult};
pub use executor::QueryResult;
pub use manager::{CreateDatabaseRequest, DatabaseInfo, DatabaseManager};
pub use node::{ApplyResult, ExecuteRequest, ExecuteResponse, Node, NodeEvent, WalRange};
pub use types::{
    DatabaseId, DatabaseRole, EncryptionMode, NodeId, NodeStatus, ReplicationPolicy, WalPosition,
};
pub use wal::{ApplyOutcome, WalEntry, WalManager, WalRecordType, ZERO_HASH};
