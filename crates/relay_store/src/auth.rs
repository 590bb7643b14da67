//! Signature-authenticated reads (spec.md §4.6): the caller signs a
//! per-endpoint challenge string, the relay recovers the signer's EVM-style
//! address from the signature, and compares it against the authorized
//! principals for that resource.
//!
//! Address recovery follows the standard secp256k1 ECDSA scheme: a 65-byte
//! compact signature (`r ‖ s ‖ v`), recovered against the Keccak-256 digest
//! of the challenge, with the address derived as the low 20 bytes of
//! `keccak256(uncompressed_pubkey[1..])`.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::{RelayError, RelayResult};

/// Builds the challenge string a caller must sign to read a mailbox
/// (`GET /messages/:address`).
#[must_use]
pub fn mailbox_challenge(address: &str, timestamp_ms: u64) -> String {
    format!("GET /messages/{address}:{timestamp_ms}")
}

/// Builds the challenge string a caller must sign to read one message
/// (`GET /message/:id`).
#[must_use]
pub fn message_challenge(message_id: &str, timestamp_ms: u64) -> String {
    format!("GET /message/{message_id}:{timestamp_ms}")
}

/// Builds the challenge string a caller must sign to mark a message read
/// (`POST /read/:id`).
#[must_use]
pub fn read_receipt_challenge(message_id: &str, timestamp_ms: u64) -> String {
    format!("POST /read/{message_id}:{timestamp_ms}")
}

/// Builds the challenge string a caller signs to subscribe over the
/// WebSocket (spec.md §6).
#[must_use]
pub fn subscribe_challenge(address: &str, timestamp_ms: u64) -> String {
    format!("Subscribe to Jeju messages:{address}:{timestamp_ms}")
}

/// Recovers the signer's address from a `0x`-prefixed hex signature over
/// `message`. The signature must be the 65-byte Ethereum compact form
/// (`r ‖ s ‖ v`), with `v` either `0`/`1` or the Ethereum-conventional
/// `27`/`28`.
pub fn recover_address(message: &str, signature_hex: &str) -> RelayResult<String> {
    let sig_bytes = decode_hex(signature_hex.trim_start_matches("0x"))
        .map_err(|_| RelayError::AuthError("signature is not valid hex".to_string()))?;
    if sig_bytes.len() != 65 {
        return Err(RelayError::AuthError("signature must be 65 bytes".to_string()));
    }

    let signature = Signature::from_slice(&sig_bytes[..64])
        .map_err(|_| RelayError::AuthError("malformed signature".to_string()))?;
    let v = match sig_bytes[64] {
        27 | 0 => 0u8,
        28 | 1 => 1u8,
        other => return Err(RelayError::AuthError(format!("unrecognized recovery byte {other}"))),
    };
    let recovery_id =
        RecoveryId::from_byte(v).ok_or_else(|| RelayError::AuthError("invalid recovery id".to_string()))?;

    let digest = Keccak256::digest(message.as_bytes());
    let verifying_key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| RelayError::AuthError("signature does not recover to a key".to_string()))?;

    Ok(address_from_verifying_key(&verifying_key))
}

fn address_from_verifying_key(key: &VerifyingKey) -> String {
    let uncompressed = key.to_encoded_point(false);
    let pubkey_bytes = uncompressed.as_bytes();
    // Skip the leading 0x04 uncompressed-point tag before hashing.
    let hash = Keccak256::digest(&pubkey_bytes[1..]);
    format!("0x{}", encode_hex(&hash[12..]))
}

/// Case-insensitive address comparison: Ethereum-style addresses are
/// conventionally rendered with EIP-55 mixed-case checksums, but this relay
/// treats them as opaque hex and never checksums on the way in.
#[must_use]
pub fn addresses_match(a: &str, b: &str) -> bool {
    a.trim_start_matches("0x").eq_ignore_ascii_case(b.trim_start_matches("0x"))
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn decode_hex(s: &str) -> Result<Vec<u8>, ()> {
    if s.len() % 2 != 0 {
        return Err(());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| ()))
        .collect()
}
