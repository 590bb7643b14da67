//! # Rate Limiter
//!
//! Tiered fixed-window request limiting (spec.md §4.7), pluggable between an
//! in-memory LRU store for a single node and a `node_core`-hosted database
//! store for limits shared across a replicated fleet.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────┐
//! │               RateLimiter<S>               │
//! │   (resolve tier, prefix key, check/reset)  │
//! └───────────────────┬───────────────────────┘
//!                     │
//!            ┌────────▼────────┐
//!            │  RateLimitStore  │  (capability-set trait)
//!            └───┬──────────┬──┘
//!                │          │
//!       ┌────────▼──┐   ┌───▼───────────┐
//!       │  LruStore  │   │ DatabaseStore │
//!       │ (in-memory)│   │ (node_core)   │
//!       └────────────┘   └───────────────┘
//! ```
//!
//! ## Key Invariants
//!
//! - **Atomic fixed window**: a store's `maybe_increment` performs the
//!   lookup-or-create and increment-or-reset steps as one unit, so
//!   concurrent callers never undercount a burst.
//! - **Lifecycle-tied sweeping**: a store's background eviction task is
//!   owned by the store and stopped on drop, never left to a finalizer.
//! - **Explicit handles over globals**: [`RateLimiter`] is constructed and
//!   passed around directly; [`init_rate_limiter`] exists only for a
//!   binary's entry point.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod database;
mod error;
mod limiter;
mod memory;
mod singleton;
mod store;

pub use config::{RateLimiterConfig, Tier};
pub use database::{DatabaseStore, SCHEMA};
pub use error::{RateLimiterError, RateLimiterResult};
pub use limiter::{CheckResult, RateLimiter};
pub use memory::LruStore;
pub use singleton::{get_rate_limiter, init_rate_limiter, reset_rate_limiter, RateLimiting};
pub use store::{RateLimitStore, WindowState};
