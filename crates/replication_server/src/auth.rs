//! Peer authentication between a primary and its followers.
//!
//! This is a shared-secret HMAC scheme distinct from relay_store's
//! ECDSA user authentication: replication peers are nodes under common
//! operational control, not end users, so a pre-shared secret is
//! sufficient. A signed request carries a Unix-millis timestamp so a
//! captured header can't be replayed indefinitely.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::{ServerError, ServerResult};

type HmacSha256 = Hmac<Sha256>;

/// How long a signed peer-auth header remains valid after issuance.
const TOKEN_WINDOW: Duration = Duration::from_secs(60);

/// Shared-secret peer authentication, enabled when a primary is
/// configured with [`crate::config::ServerConfig::auth_secret`].
#[derive(Clone)]
pub struct PeerAuth {
    secret: Vec<u8>,
}

impl PeerAuth {
    /// Creates a peer-auth signer/verifier from a shared secret.
    #[must_use]
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret }
    }

    /// Produces a header value of the form `<timestamp>.<hex hmac>` for
    /// use in a follower's outgoing `Authorization` header.
    #[must_use]
    pub fn sign(&self) -> String {
        let timestamp = now_millis();
        let signature = self.hmac(timestamp);
        format!("{timestamp}.{}", hex_encode(&signature))
    }

    /// Verifies a header value produced by [`PeerAuth::sign`].
    pub fn verify(&self, header: &str) -> ServerResult<()> {
        let (timestamp_part, sig_part) = header
            .split_once('.')
            .ok_or_else(|| ServerError::Unauthorized("malformed peer-auth header".to_string()))?;

        let timestamp: u64 = timestamp_part
            .parse()
            .map_err(|_| ServerError::Unauthorized("malformed peer-auth timestamp".to_string()))?;

        let now = now_millis();
        let age = now.saturating_sub(timestamp);
        if age > TOKEN_WINDOW.as_millis() as u64 {
            return Err(ServerError::Unauthorized("peer-auth token expired".to_string()));
        }

        let expected = hex_encode(&self.hmac(timestamp));
        if !constant_time_eq(expected.as_bytes(), sig_part.as_bytes()) {
            return Err(ServerError::Unauthorized("peer-auth signature mismatch".to_string()));
        }

        Ok(())
    }

    fn hmac(&self, timestamp: u64) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts a key of any size");
        mac.update(&timestamp.to_be_bytes());
        mac.finalize().into_bytes().into()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_token_verifies() {
        let auth = PeerAuth::new(b"shared-secret".to_vec());
        let token = auth.sign();
        assert!(auth.verify(&token).is_ok());
    }

    #[test]
    fn wrong_secret_fails() {
        let auth = PeerAuth::new(b"shared-secret".to_vec());
        let other = PeerAuth::new(b"different-secret".to_vec());
        let token = auth.sign();
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn malformed_header_is_rejected() {
        let auth = PeerAuth::new(b"shared-secret".to_vec());
        assert!(auth.verify("not-a-valid-token").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = PeerAuth::new(b"shared-secret".to_vec());
        let stale_timestamp = now_millis() - TOKEN_WINDOW.as_millis() as u64 - 1_000;
        let signature = hex_encode(&auth.hmac(stale_timestamp));
        let token = format!("{stale_timestamp}.{signature}");
        assert!(auth.verify(&token).is_err());
    }
}
