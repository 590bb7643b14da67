//! # http_adapter
//!
//! Thin HTTP/WebSocket adapter (spec.md §4.8) composing the node's own
//! `/query`/`/batch`/`/health`/`/metrics` routes with the replication
//! server's `/wal` routes and the relay store's `/relay`/`/ws` routes
//! under one CORS layer and one rate-limit middleware.
//!
//! This crate owns no state of its own beyond [`state::AppState`]; every
//! route handler reads through to [`node_core::Node`], an optional
//! [`relay_store::RelayServerState`], and an optional
//! `rate_limiter::RateLimiting` trait object.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod lag;
mod middleware;
mod routes;
mod server;
mod state;

pub use config::HttpConfig;
pub use error::{AdapterError, AdapterResult};
pub use lag::ReplicationLagSource;
pub use routes::router;
pub use server::{build_router, HttpServer};
pub use state::{AppState, DeniedCounters};
