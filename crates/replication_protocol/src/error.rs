//! Errors converting between wire types and [`node_core`] types.

use thiserror::Error;

/// Result type for protocol conversions.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors converting a [`crate::WalEntryWire`] to/from [`node_core::WalEntry`].
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A `prevHash`/`hash` field was not exactly 32 bytes of hex.
    #[error("malformed hash field: {0}")]
    MalformedHash(String),

    /// A parameter value's JSON shape has no counterpart in the closed
    /// value union.
    #[error("malformed parameter value: {0}")]
    MalformedValue(String),

    /// The database id was not a well-formed UUID.
    #[error("malformed database id: {0}")]
    MalformedDatabaseId(String),
}
