//! WAL entry type and its on-disk serialization.

use crate::error::{NodeError, NodeResult};
use node_codec::Value;

/// Magic bytes identifying a WAL record.
pub const WAL_MAGIC: [u8; 4] = *b"SQWL";

/// Current WAL format version.
pub const WAL_VERSION: u16 = 1;

/// SHA-256, the only hash algorithm this format currently defines. The
/// 1-byte tag is carried in every record so a future algorithm can be
/// introduced without breaking readers of older logs.
pub const HASH_ALG_SHA256: u8 = 0x01;

/// Width in bytes of every hash this format produces.
pub const HASH_WIDTH: usize = 32;

/// The zero hash used as `prevHash` for the entry at position 1.
pub const ZERO_HASH: [u8; HASH_WIDTH] = [0u8; HASH_WIDTH];

/// Type of WAL record. Only one variant exists today; the byte is kept in
/// the framing header so a future record kind (e.g. a checkpoint marker)
/// can be added without changing the envelope format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WalRecordType {
    /// A committed mutating statement.
    Entry = 1,
}

impl WalRecordType {
    /// Converts a byte to a record type.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Entry),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One committed write in a database's hash chain.
///
/// `hash = SHA256(position ‖ sql ‖ canonical_encode(params) ‖ timestamp ‖ prevHash)`.
/// Entries are totally ordered by `position`; for any two consecutive
/// entries `entry[i+1].prev_hash == entry[i].hash`.
#[derive(Debug, Clone, PartialEq)]
pub struct WalEntry {
    /// Per-database monotonic position, starting at 1.
    pub position: u64,
    /// The SQL text that was executed.
    pub sql: String,
    /// Positional parameters bound to the statement.
    pub params: Vec<Value>,
    /// Wall-clock milliseconds at commit time.
    pub timestamp: u64,
    /// Hash of the entry at `position - 1`, or [`ZERO_HASH`] at position 1.
    pub prev_hash: [u8; HASH_WIDTH],
    /// This entry's hash.
    pub hash: [u8; HASH_WIDTH],
}

impl WalEntry {
    /// Maximum size for a record payload.
    ///
    /// Payloads larger than this are rejected because the WAL envelope uses
    /// a 4-byte length field.
    pub const MAX_PAYLOAD_SIZE: usize = u32::MAX as usize;

    /// Computes the hash for a prospective entry without constructing it,
    /// so callers can both assign `hash` and verify a peer's claimed hash.
    pub fn compute_hash(
        position: u64,
        sql: &str,
        params: &[Value],
        timestamp: u64,
        prev_hash: &[u8; HASH_WIDTH],
    ) -> NodeResult<[u8; HASH_WIDTH]> {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(position.to_le_bytes());
        hasher.update((sql.len() as u64).to_le_bytes());
        hasher.update(sql.as_bytes());

        let encoded_params = encode_params(params)?;
        hasher.update((encoded_params.len() as u64).to_le_bytes());
        hasher.update(&encoded_params);

        hasher.update(timestamp.to_le_bytes());
        hasher.update(prev_hash);

        let digest = hasher.finalize();
        let mut out = [0u8; HASH_WIDTH];
        out.copy_from_slice(&digest);
        Ok(out)
    }

    /// Builds a new entry, computing its hash from the other fields.
    pub fn new(
        position: u64,
        sql: String,
        params: Vec<Value>,
        timestamp: u64,
        prev_hash: [u8; HASH_WIDTH],
    ) -> NodeResult<Self> {
        let hash = Self::compute_hash(position, &sql, &params, timestamp, &prev_hash)?;
        Ok(Self {
            position,
            sql,
            params,
            timestamp,
            prev_hash,
            hash,
        })
    }

    /// Recomputes this entry's hash from its fields and compares it against
    /// the stored `hash`, detecting tampering or corruption.
    pub fn verify_self_hash(&self) -> NodeResult<bool> {
        let expected =
            Self::compute_hash(self.position, &self.sql, &self.params, self.timestamp, &self.prev_hash)?;
        Ok(expected == self.hash)
    }

    /// Serializes the record payload (without the envelope).
    ///
    /// # Errors
    ///
    /// Returns an error if `sql` or the encoded params exceed
    /// [`Self::MAX_PAYLOAD_SIZE`].
    pub fn encode_payload(&self) -> NodeResult<Vec<u8>> {
        let mut buf = Vec::new();

        buf.extend_from_slice(&self.position.to_le_bytes());
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf.push(HASH_ALG_SHA256);
        buf.extend_from_slice(&self.prev_hash);
        buf.extend_from_slice(&self.hash);

        let sql_bytes = self.sql.as_bytes();
        if sql_bytes.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(NodeError::wal_corruption(format!(
                "sql text too large: {} bytes exceeds maximum of {} bytes",
                sql_bytes.len(),
                Self::MAX_PAYLOAD_SIZE
            )));
        }
        buf.extend_from_slice(&(sql_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(sql_bytes);

        let encoded_params = encode_params(&self.params)?;
        if encoded_params.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(NodeError::wal_corruption(format!(
                "params too large: {} bytes exceeds maximum of {} bytes",
                encoded_params.len(),
                Self::MAX_PAYLOAD_SIZE
            )));
        }
        buf.extend_from_slice(&(encoded_params.len() as u32).to_le_bytes());
        buf.extend_from_slice(&encoded_params);

        Ok(buf)
    }

    /// Deserializes a record from its type and payload.
    pub fn decode_payload(record_type: WalRecordType, payload: &[u8]) -> NodeResult<Self> {
        if record_type != WalRecordType::Entry {
            return Err(NodeError::wal_corruption("unknown WAL record type"));
        }

        let mut cursor = 0usize;

        let position = read_u64(payload, &mut cursor)?;
        let timestamp = read_u64(payload, &mut cursor)?;

        if cursor >= payload.len() {
            return Err(NodeError::wal_corruption("unexpected end of payload"));
        }
        let hash_alg = payload[cursor];
        cursor += 1;
        if hash_alg != HASH_ALG_SHA256 {
            return Err(NodeError::wal_corruption(format!(
                "unsupported hash algorithm tag: {hash_alg}"
            )));
        }

        let prev_hash = read_hash(payload, &mut cursor)?;
        let hash = read_hash(payload, &mut cursor)?;

        let sql_len = read_u32(payload, &mut cursor)? as usize;
        if cursor + sql_len > payload.len() {
            return Err(NodeError::wal_corruption("unexpected end of sql text"));
        }
        let sql = std::str::from_utf8(&payload[cursor..cursor + sql_len])
            .map_err(|_| NodeError::wal_corruption("sql text is not valid UTF-8"))?
            .to_string();
        cursor += sql_len;

        let params_len = read_u32(payload, &mut cursor)? as usize;
        if cursor + params_len > payload.len() {
            return Err(NodeError::wal_corruption("unexpected end of params"));
        }
        let params = decode_params(&payload[cursor..cursor + params_len])?;
        cursor += params_len;

        if cursor != payload.len() {
            return Err(NodeError::wal_corruption(format!(
                "trailing bytes in WAL entry: expected {} bytes, got {}",
                cursor,
                payload.len()
            )));
        }

        Ok(Self {
            position,
            sql,
            params,
            timestamp,
            prev_hash,
            hash,
        })
    }
}

fn encode_params(params: &[Value]) -> NodeResult<Vec<u8>> {
    node_codec::to_canonical_cbor(&Value::Array(params.to_vec()))
        .map_err(|e| NodeError::wal_corruption(format!("failed to encode params: {e}")))
}

fn decode_params(bytes: &[u8]) -> NodeResult<Vec<Value>> {
    match node_codec::from_cbor(bytes)
        .map_err(|e| NodeError::wal_corruption(format!("failed to decode params: {e}")))?
    {
        Value::Array(items) => Ok(items),
        _ => Err(NodeError::wal_corruption("params payload was not an array")),
    }
}

fn read_u64(payload: &[u8], cursor: &mut usize) -> NodeResult<u64> {
    if *cursor + 8 > payload.len() {
        return Err(NodeError::wal_corruption("unexpected end of payload"));
    }
    let bytes: [u8; 8] = payload[*cursor..*cursor + 8]
        .try_into()
        .map_err(|_| NodeError::wal_corruption("invalid u64"))?;
    *cursor += 8;
    Ok(u64::from_le_bytes(bytes))
}

fn read_u32(payload: &[u8], cursor: &mut usize) -> NodeResult<u32> {
    if *cursor + 4 > payload.len() {
        return Err(NodeError::wal_corruption("unexpected end of payload"));
    }
    let bytes: [u8; 4] = payload[*cursor..*cursor + 4]
        .try_into()
        .map_err(|_| NodeError::wal_corruption("invalid u32"))?;
    *cursor += 4;
    Ok(u32::from_le_bytes(bytes))
}

fn read_hash(payload: &[u8], cursor: &mut usize) -> NodeResult<[u8; HASH_WIDTH]> {
    if *cursor + HASH_WIDTH > payload.len() {
        return Err(NodeError::wal_corruption("unexpected end of hash"));
    }
    let mut out = [0u8; HASH_WIDTH];
    out.copy_from_slice(&payload[*cursor..*cursor + HASH_WIDTH]);
    *cursor += HASH_WIDTH;
    Ok(out)
}

/// Computes CRC32 checksum for data (IEEE polynomial), used as the
/// per-record envelope checksum independent of the hash chain.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        let index = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC32_TABLE[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_type_roundtrip() {
        assert_eq!(
            WalRecordType::from_byte(WalRecordType::Entry.as_byte()),
            Some(WalRecordType::Entry)
        );
        assert_eq!(WalRecordType::from_byte(0xFF), None);
    }

    #[test]
    fn entry_roundtrip_no_params() {
        let entry = WalEntry::new(1, "CREATE TABLE t (x INT)".to_string(), vec![], 1_000, ZERO_HASH)
            .unwrap();
        let payload = entry.encode_payload().unwrap();
        let decoded = WalEntry::decode_payload(WalRecordType::Entry, &payload).unwrap();
        assert_eq!(entry, decoded);
        assert!(decoded.verify_self_hash().unwrap());
    }

    #[test]
    fn entry_roundtrip_with_params() {
        let params = vec![
            Value::Integer(42),
            Value::Text("alice".to_string()),
            Value::Null,
            Value::Bool(true),
            Value::Float(3.25),
            Value::Bytes(vec![0xCA, 0xFE]),
        ];
        let entry = WalEntry::new(
            2,
            "INSERT INTO users VALUES (?, ?, ?, ?, ?, ?)".to_string(),
            params.clone(),
            2_000,
            [0xAB; 32],
        )
        .unwrap();
        let payload = entry.encode_payload().unwrap();
        let decoded = WalEntry::decode_payload(WalRecordType::Entry, &payload).unwrap();
        assert_eq!(decoded.params, params);
        assert_eq!(entry, decoded);
    }

    #[test]
    fn hash_chain_links() {
        let e1 = WalEntry::new(1, "INSERT INTO t VALUES (1)".to_string(), vec![], 1, ZERO_HASH).unwrap();
        let e2 = WalEntry::new(
            2,
            "INSERT INTO t VALUES (2)".to_string(),
            vec![],
            2,
            e1.hash,
        )
        .unwrap();
        assert_eq!(e2.prev_hash, e1.hash);
        assert_ne!(e1.hash, e2.hash);
    }

    #[test]
    fn different_typed_params_do_not_collide() {
        // "1" (text) and 1 (integer) must hash differently even though they
        // "print" the same, since encode(params) is injective over the type
        // universe.
        let a = WalEntry::new(
            1,
            "q".to_string(),
            vec![Value::Text("1".to_string())],
            0,
            ZERO_HASH,
        )
        .unwrap();
        let b = WalEntry::new(1, "q".to_string(), vec![Value::Integer(1)], 0, ZERO_HASH).unwrap();
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn tampered_entry_fails_self_verification() {
        let mut entry =
            WalEntry::new(1, "INSERT INTO t VALUES (1)".to_string(), vec![], 0, ZERO_HASH).unwrap();
        entry.sql = "INSERT INTO t VALUES (2)".to_string();
        assert!(!entry.verify_self_hash().unwrap());
    }

    #[test]
    fn reject_trailing_bytes() {
        let entry = WalEntry::new(1, "x".to_string(), vec![], 0, ZERO_HASH).unwrap();
        let mut payload = entry.encode_payload().unwrap();
        payload.push(0xFF);
        let result = WalEntry::decode_payload(WalRecordType::Entry, &payload);
        assert!(result.is_err());
    }

    #[test]
    fn crc32_known_value() {
        let crc = compute_crc32(b"123456789");
        assert_eq!(crc, 0xCBF4_3926);
    }

    #[test]
    fn crc32_empty() {
        let crc = compute_crc32(b"");
        assert_eq!(crc, 0x0000_0000);
    }
}
