//! # replication_server
//!
//! Primary-side half of WAL replication (spec.md §4.5, §6): the primary is
//! passive, so this crate is thin — it exposes a `GET /wal` route that
//! serves a window of a database's WAL to whichever follower asks, behind
//! the shared-secret peer authentication in [`auth`].
//!
//! The `POST /wal/apply` endpoint lives here too, even though most
//! deployments apply locally through `replication_engine`'s in-process
//! [`node_core::Node`] handle: it exists so a follower that only has HTTP
//! access to its own node (e.g. a CLI operating remotely) can still drive
//! an apply, and so `http_adapter` has one router to nest rather than two.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
mod config;
mod error;
mod server;

pub use auth::PeerAuth;
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::{router, ReplicationServerState};
