//! # Relay Store
//!
//! A write-through message relay layered over a node-hosted database
//! (spec.md §4.6, §6): durable persistence, an in-memory id-uniqueness
//! cache, per-recipient pending queues for offline delivery, and
//! WebSocket fan-out to live subscribers.
//!
//! ## Architecture
//!
//! ```text
//! POST /send ──► RelayStore::submit ──► node-hosted `messages` table
//!                        │                       ▲
//!                        ▼                       │
//!               SubscriberRegistry        GET /messages/:address
//!               (live WebSocket fan-out)   GET /message/:id
//! ```
//!
//! Retrieval endpoints authenticate callers via a signed, per-endpoint
//! challenge string recovered to an EVM-style address (`auth` module);
//! ingress authenticates nothing beyond shape and replay/freshness
//! (`envelope` module).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod config;
mod envelope;
mod error;
mod routes;
mod store;
mod subscriber;

pub use auth::{
    addresses_match, mailbox_challenge, message_challenge, read_receipt_challenge, recover_address,
    subscribe_challenge,
};
pub use config::RelayConfig;
pub use envelope::{EncryptedContent, MessageEnvelope};
pub use error::{RelayError, RelayResult};
pub use routes::{router, RelayServerState};
pub use store::{RelayStore, SubmitOutcome};
pub use subscriber::{ServerFrame, SubscriberRegistry};
