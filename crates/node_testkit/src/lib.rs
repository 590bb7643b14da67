//! # node_testkit
//!
//! Test utilities shared across the workspace: quick-to-construct node
//! fixtures, property-based generators, golden vectors, fuzz harnesses,
//! crash-recovery helpers, stress helpers, and a cross-crate replication
//! integration harness.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod crash;
pub mod fixtures;
pub mod fuzz;
pub mod generators;
pub mod golden;
pub mod integration;
pub mod stress;
pub mod vectors;
