//! WAL writer/reader: append, range reads, and idempotent replica apply.

use crate::error::{NodeError, NodeResult};
use crate::wal::record::{
    compute_crc32, WalEntry, WalRecordType, HASH_WIDTH, WAL_MAGIC, WAL_VERSION, ZERO_HASH,
};
use node_codec::Value;
use node_storage::StorageBackend;
use parking_lot::Mutex;

/// magic (4) + version (2) + type (1) + length (4) = 11 bytes.
const HEADER_SIZE: usize = 11;
/// Trailing CRC32.
const CRC_SIZE: usize = 4;

/// The in-memory tip of the hash chain, kept so `append` doesn't have to
/// rescan the log to learn the previous entry's hash.
#[derive(Debug, Clone, Copy)]
struct ChainTip {
    position: u64,
    hash: [u8; HASH_WIDTH],
}

/// Outcome of applying one WAL entry as a replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The entry was already applied; nothing changed.
    AlreadyApplied,
    /// The entry extended the chain by one position.
    Applied,
    /// The entry is ahead of the local chain; caller must fetch the gap.
    Gap,
}

/// Manages one database's append-only, hash-chained WAL file.
///
/// Durability: every [`WalManager::append`] writes a framed record
/// (`magic | version | type | length | payload | crc32`) to the backend and,
/// if configured, flushes before returning. The in-memory [`ChainTip`] is
/// only advanced after the backend write succeeds, so a crash mid-write
/// leaves the chain exactly as long as its last fully-durable entry.
pub struct WalManager {
    backend: Mutex<Box<dyn StorageBackend>>,
    tip: Mutex<ChainTip>,
    sync_on_write: bool,
}

impl WalManager {
    /// Opens a WAL manager over `backend`, replaying any existing records
    /// to recover the chain tip. A partially written trailing record (torn
    /// by a crash) is discarded rather than treated as corruption.
    pub fn open(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> NodeResult<Self> {
        let manager = Self {
            backend: Mutex::new(backend),
            tip: Mutex::new(ChainTip {
                position: 0,
                hash: ZERO_HASH,
            }),
            sync_on_write,
        };
        let tip = manager.recover_tip()?;
        *manager.tip.lock() = tip;
        Ok(manager)
    }

    fn recover_tip(&self) -> NodeResult<ChainTip> {
        let mut tip = ChainTip {
            position: 0,
            hash: ZERO_HASH,
        };
        for result in self.scan()? {
            match result {
                Ok((_offset, entry)) => {
                    tip = ChainTip {
                        position: entry.position,
                        hash: entry.hash,
                    };
                }
                Err(_) => break, // torn trailing record; stop at last good entry
            }
        }
        Ok(tip)
    }

    /// Appends a new mutating statement to the log, computing its position
    /// and hash from the current chain tip.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing, encoding, or the backend write fails.
    pub fn append(&self, sql: &str, params: &[Value], timestamp: u64) -> NodeResult<WalEntry> {
        let mut tip = self.tip.lock();
        let position = tip.position + 1;
        let entry = WalEntry::new(position, sql.to_string(), params.to_vec(), timestamp, tip.hash)?;
        self.write_framed(&entry)?;
        tip.position = entry.position;
        tip.hash = entry.hash;
        Ok(entry)
    }

    /// Idempotently applies a replica-bound entry pulled from a primary.
    ///
    /// - `entry.position <= current position`: no-op, [`ApplyOutcome::AlreadyApplied`].
    /// - `entry.position == current position + 1`: verified against the
    ///   local chain tip and appended; mismatch is
    ///   [`NodeError::HashChainBroken`].
    /// - `entry.position > current position + 1`: [`ApplyOutcome::Gap`], the
    ///   caller must fetch the missing range first.
    pub fn apply_replicated(&self, database_id: &str, entry: &WalEntry) -> NodeResult<ApplyOutcome> {
        let mut tip = self.tip.lock();
        if entry.position <= tip.position {
            return Ok(ApplyOutcome::AlreadyApplied);
        }
        if entry.position > tip.position + 1 {
            return Ok(ApplyOutcome::Gap);
        }
        if entry.prev_hash != tip.hash {
            return Err(NodeError::HashChainBroken {
                database_id: database_id.to_string(),
                position: entry.position,
            });
        }
        if !entry.verify_self_hash()? {
            return Err(NodeError::HashChainBroken {
                database_id: database_id.to_string(),
                position: entry.position,
            });
        }
        self.write_framed(entry)?;
        tip.position = entry.position;
        tip.hash = entry.hash;
        Ok(ApplyOutcome::Applied)
    }

    fn write_framed(&self, entry: &WalEntry) -> NodeResult<u64> {
        let payload = entry.encode_payload()?;
        let mut data = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        data.extend_from_slice(&WAL_MAGIC);
        data.extend_from_slice(&WAL_VERSION.to_le_bytes());
        data.push(WalRecordType::Entry.as_byte());
        let len = u32::try_from(payload.len())
            .map_err(|_| NodeError::validation("WAL record payload too large"))?;
        data.extend_from_slice(&len.to_le_bytes());
        data.extend_from_slice(&payload);
        let crc = compute_crc32(&data);
        data.extend_from_slice(&crc.to_le_bytes());

        let mut backend = self.backend.lock();
        let offset = backend.append(&data)?;
        if self.sync_on_write {
            backend.sync()?;
        }
        Ok(offset)
    }

    /// Returns the latest committed position (0 if empty).
    #[must_use]
    pub fn current_position(&self) -> u64 {
        self.tip.lock().position
    }

    /// Returns the hash of the latest committed entry, or the zero hash if
    /// the log is empty.
    #[must_use]
    pub fn current_hash(&self) -> [u8; HASH_WIDTH] {
        self.tip.lock().hash
    }

    /// Reads entries starting at `from_position` (inclusive), up to `limit`.
    /// Returns the entries found plus the current committed position.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or a record is
    /// corrupted.
    pub fn read_range(&self, from_position: u64, limit: usize) -> NodeResult<(Vec<WalEntry>, u64)> {
        let mut out = Vec::new();
        for result in self.scan()? {
            let (_offset, entry) = result?;
            if entry.position < from_position {
                continue;
            }
            out.push(entry);
            if out.len() >= limit {
                break;
            }
        }
        Ok((out, self.current_position()))
    }

    /// Streams every framed record in the log from the start, decoding and
    /// CRC-checking each one. Stops (without erroring) at the first
    /// truncated trailing record, which recovery treats as a torn write.
    fn scan(&self) -> NodeResult<Vec<NodeResult<(u64, WalEntry)>>> {
        let backend = self.backend.lock();
        let size = backend.size()?;
        let mut out = Vec::new();
        let mut cursor = 0u64;

        while cursor + HEADER_SIZE as u64 <= size {
            let header = backend.read_at(cursor, HEADER_SIZE)?;
            if header[0..4] != WAL_MAGIC {
                break;
            }
            let version = u16::from_le_bytes([header[4], header[5]]);
            if version != WAL_VERSION {
                out.push(Err(NodeError::wal_corruption(format!(
                    "unsupported WAL version {version}"
                ))));
                break;
            }
            let record_type = match WalRecordType::from_byte(header[6]) {
                Some(t) => t,
                None => {
                    out.push(Err(NodeError::wal_corruption("unknown record type byte")));
                    break;
                }
            };
            let payload_len =
                u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as u64;
            let record_len = HEADER_SIZE as u64 + payload_len + CRC_SIZE as u64;
            if cursor + record_len > size {
                break; // torn trailing write
            }

            let full = backend.read_at(cursor, record_len as usize)?;
            let payload = &full[HEADER_SIZE..HEADER_SIZE + payload_len as usize];
            let stored_crc = u32::from_le_bytes(
                full[full.len() - CRC_SIZE..].try_into().expect("4 bytes"),
            );
            let computed_crc = compute_crc32(&full[..full.len() - CRC_SIZE]);
            if stored_crc != computed_crc {
                out.push(Err(NodeError::wal_corruption("CRC mismatch")));
                break;
            }

            match WalEntry::decode_payload(record_type, payload) {
                Ok(entry) => out.push(Ok((cursor, entry))),
                Err(e) => {
                    out.push(Err(e));
                    break;
                }
            }
            cursor += record_len;
        }
        Ok(out)
    }

    /// Flushes pending writes to durable storage.
    pub fn flush(&self) -> NodeResult<()> {
        self.backend.lock().flush()?;
        Ok(())
    }
}

impl std::fmt::Debug for WalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tip = self.tip.lock();
        f.debug_struct("WalManager")
            .field("position", &tip.position)
            .field("sync_on_write", &self.sync_on_write)
            .finish_non_exhaustive()
    }
}
