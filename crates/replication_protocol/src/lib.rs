//! # replication_protocol
//!
//! Wire types for the primary/follower WAL replication protocol (spec.md
//! §4.5, §6). The primary is passive: it only ever answers a
//! [`PullRequest`] with a [`PullResponse`]; there is no push direction,
//! since this system's replication is follower-pull only.
//!
//! ## Key Invariants
//!
//! - [`PullResponse::entries`] is dense and strictly increasing in
//!   `position`, starting at the request's `from_position` if present.
//! - [`WalEntryWire`] carries the same hash-chain fields as
//!   [`node_core::WalEntry`]; converting between them is lossless.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use wire::{ApplyRequest, ApplyResponse, PullRequest, PullResponse, WalEntryWire};
