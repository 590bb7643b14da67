//! # replication_engine
//!
//! Follower-side half of WAL replication (spec.md §4.5, §6). The primary
//! is passive — it only ever serves ranges of its own WAL through
//! `replication_server`. This crate is what drives the other side: a
//! [`Coordinator`] per replicated database that polls a primary via a
//! [`Transport`], applies accepted entries through a [`ReplicaHandle`],
//! and tracks convergence as a [`FollowerState`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod state;
mod transport;

pub use config::{ReplicationConfig, RetryConfig};
pub use error::{ReplicationError, ReplicationResult};
pub use http::HttpTransport;
pub use state::{Coordinator, FollowerState, PullOutcome, ReplicaHandle};
pub use transport::{MockTransport, Transport};
