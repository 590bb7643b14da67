//! Per-database write-ahead log: hash-chained durability and range reads.
//!
//! ## WAL Record Framing
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! ## Invariants
//!
//! - The log is **append-only**; entries are never rewritten.
//! - `entry[i+1].prevHash == entry[i].hash` for all consecutive entries.
//! - On crash, the last fully-durable entry wins; a torn trailing write is
//!   discarded on recovery, never treated as corruption of earlier entries.
//! - Applying a replicated entry is **idempotent**.

mod record;
mod writer;

pub use record::{
    compute_crc32, WalEntry, WalRecordType, HASH_ALG_SHA256, HASH_WIDTH, WAL_MAGIC, WAL_VERSION,
    ZERO_HASH,
};
pub use writer::{ApplyOutcome, WalManager};
