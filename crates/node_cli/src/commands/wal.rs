//! `node wal dump|verify` (spec.md §4.2, §6): operate directly on a
//! database's `wal.log`, without opening `data.db` or running any SQL —
//! useful for inspecting a database this process doesn't otherwise have
//! a role in (e.g. auditing a replica's chain offline).

use std::path::Path;

use node_core::WalManager;
use node_storage::{FileBackend, StorageBackend};
use replication_protocol::WalEntryWire;

use crate::error::{CliError, CliResult};

fn open_wal(data_dir: &Path, database_id: &str) -> CliResult<WalManager> {
    let path = data_dir.join("databases").join(database_id).join("wal.log");
    if !path.exists() {
        return Err(CliError::Config(format!("no wal.log under {}", path.display())));
    }
    let backend: Box<dyn StorageBackend> = Box::new(FileBackend::open(&path)?);
    Ok(WalManager::open(backend, false)?)
}

/// `node wal dump --database ID [--from N] [--limit N] [--format text|json]`.
pub fn dump(data_dir: &Path, database_id: &str, from: u64, limit: usize, format: &str) -> CliResult<()> {
    let wal = open_wal(data_dir, database_id)?;
    let (entries, current_position) = wal.read_range(from.max(1), limit)?;

    match format {
        "json" => {
            let wire: Vec<WalEntryWire> = entries
                .iter()
                .map(WalEntryWire::from_entry)
                .collect::<Result<_, _>>()
                .map_err(|err| CliError::Config(format!("failed to render WAL entry: {err}")))?;
            let out = serde_json::to_string_pretty(&wire)
                .map_err(|err| CliError::Config(format!("failed to encode WAL entries: {err}")))?;
            println!("{out}");
        }
        "text" | _ => {
            for entry in &entries {
                println!(
                    "#{:<8} {} params={} prevHash={} hash={}",
                    entry.position,
                    entry.sql,
                    entry.params.len(),
                    hex_prefix(&entry.prev_hash),
                    hex_prefix(&entry.hash)
                );
            }
            println!("-- current position: {current_position}");
        }
    }
    Ok(())
}

/// `node wal verify --database ID`: walks the full chain from position 1,
/// confirming each entry's `prevHash` matches its predecessor's `hash`
/// (spec.md §4.2's hash-chain invariant) and that position 1 chains from
/// the zero hash. Reports the first break found, if any.
pub fn verify(data_dir: &Path, database_id: &str) -> CliResult<()> {
    let wal = open_wal(data_dir, database_id)?;
    let (entries, current_position) = wal.read_range(1, usize::MAX)?;

    let mut expected_prev = node_core::ZERO_HASH;
    for entry in &entries {
        if entry.prev_hash != expected_prev {
            println!(
                "BROKEN at position {}: expected prevHash {}, found {}",
                entry.position,
                hex_prefix(&expected_prev),
                hex_prefix(&entry.prev_hash)
            );
            return Err(CliError::Config(format!(
                "hash chain broken for database {database_id} at position {}",
                entry.position
            )));
        }
        if !entry.verify_self_hash().unwrap_or(false) {
            println!("BROKEN at position {}: self hash mismatch", entry.position);
            return Err(CliError::Config(format!(
                "hash self-verification failed for database {database_id} at position {}",
                entry.position
            )));
        }
        expected_prev = entry.hash;
    }

    println!("OK: {} entries verified, current position {current_position}", entries.len());
    Ok(())
}

fn hex_prefix(bytes: &[u8]) -> String {
    bytes.iter().take(6).map(|b| format!("{b:02x}")).collect::<String>()
}
