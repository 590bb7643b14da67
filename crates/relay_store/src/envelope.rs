//! Message envelopes (spec.md §3): the relay's unit of ingress, persisted
//! both durably and in the in-memory cache.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};

/// Ciphertext plus the key-exchange material a recipient needs to decrypt
/// it. The relay never inspects the plaintext.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedContent {
    /// Opaque ciphertext, hex-encoded.
    pub ciphertext: String,
    /// Sender's ephemeral public key for this message, hex-encoded.
    pub ephemeral_public_key: String,
    /// Nonce used for the encryption, hex-encoded.
    pub nonce: String,
}

/// One relay payload (spec.md §3). `id` is sender-chosen and must be
/// globally unique; the relay enforces that uniqueness at ingress as its
/// replay defense.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEnvelope {
    /// Sender-chosen UUID, unique across all envelopes this relay has seen.
    pub id: String,
    /// Sender's address.
    pub from: String,
    /// Recipient's address.
    pub to: String,
    /// Opaque encrypted payload.
    pub encrypted_content: EncryptedContent,
    /// Unix millis the sender claims this was produced at.
    pub timestamp: u64,
    /// Optional sender signature over the envelope, not verified by
    /// ingress (ingress authenticity is about replay/shape, not signer
    /// identity; retrieval endpoints are what authenticate a caller).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl MessageEnvelope {
    /// Validates shape, freshness, and size (spec.md §4.6 steps 1-2, 4).
    /// Does not check id uniqueness — that's [`crate::store::RelayStore`]'s
    /// job, since it needs to consult both the cache and the durable store.
    pub fn validate(&self, config: &RelayConfig, now_ms: u64) -> RelayResult<()> {
        if self.id.is_empty() || self.from.is_empty() || self.to.is_empty() {
            return Err(RelayError::InvalidEnvelope("id, from, and to are required".to_string()));
        }
        uuid::Uuid::parse_str(&self.id).map_err(|_| RelayError::InvalidEnvelope("id is not a valid UUID".to_string()))?;

        let max_age_ms = config.max_age.as_millis() as u64;
        let max_skew_ms = config.max_skew.as_millis() as u64;
        if self.timestamp + max_age_ms < now_ms {
            return Err(RelayError::TooOld);
        }
        if self.timestamp > now_ms + max_skew_ms {
            return Err(RelayError::TooNew);
        }

        let size = serde_json::to_vec(self).map(|bytes| bytes.len()).unwrap_or(usize::MAX);
        if size > config.max_envelope_bytes {
            return Err(RelayError::TooLarge);
        }

        Ok(())
    }

    /// Computes this envelope's content identifier: SHA-256 of its
    /// canonical JSON bytes, rendered as the store's CID form
    /// (`"sha256:" + lowercase hex`) (spec.md §4.6 step 5).
    #[must_use]
    pub fn cid(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&bytes);
        format!("sha256:{}", encode_hex(&digest))
    }
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(id: &str, timestamp: u64) -> MessageEnvelope {
        MessageEnvelope {
            id: id.to_string(),
            from: "0xabc".to_string(),
            to: "0xdef".to_string(),
            encrypted_content: EncryptedContent {
                ciphertext: "ca fe".to_string(),
                ephemeral_public_key: "pub".to_string(),
                nonce: "nonce".to_string(),
            },
            timestamp,
            signature: None,
        }
    }

    #[test]
    fn rejects_too_old() {
        let config = RelayConfig::default();
        let now = 10_000_000;
        let msg = envelope(&uuid::Uuid::new_v4().to_string(), now - config.max_age.as_millis() as u64 - 1_000);
        assert!(matches!(msg.validate(&config, now), Err(RelayError::TooOld)));
    }

    #[test]
    fn rejects_too_new() {
        let config = RelayConfig::default();
        let now = 10_000_000;
        let msg = envelope(&uuid::Uuid::new_v4().to_string(), now + config.max_skew.as_millis() as u64 + 1_000);
        assert!(matches!(msg.validate(&config, now), Err(RelayError::TooNew)));
    }

    #[test]
    fn rejects_malformed_id() {
        let config = RelayConfig::default();
        let msg = envelope("not-a-uuid", 1_000);
        assert!(matches!(msg.validate(&config, 1_000), Err(RelayError::InvalidEnvelope(_))));
    }

    #[test]
    fn accepts_fresh_valid_envelope() {
        let config = RelayConfig::default();
        let now = 10_000_000;
        let msg = envelope(&uuid::Uuid::new_v4().to_string(), now);
        assert!(msg.validate(&config, now).is_ok());
    }

    #[test]
    fn cid_is_deterministic() {
        let msg = envelope(&uuid::Uuid::new_v4().to_string(), 1_000);
        assert_eq!(msg.cid(), msg.cid());
        assert!(msg.cid().starts_with("sha256:"));
    }
}
