//! Error taxonomy for node_core, per spec.md §7.

use std::io;
use thiserror::Error;

/// Result type for node operations.
pub type NodeResult<T> = Result<T, NodeError>;

/// The node's error taxonomy. Each variant names a *kind*, not an HTTP
/// status; [`NodeError::status_code`] maps kinds to the codes the HTTP
/// adapter returns.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A database or message id is unknown.
    #[error("not found: {resource}")]
    NotFound {
        /// What was not found (e.g. `"database 9c1b…"`).
        resource: String,
    },

    /// Malformed input: bad shape, oversized payload, timestamp out of
    /// window, invalid identifier.
    #[error("validation error: {message}")]
    ValidationError {
        /// Description of what failed validation.
        message: String,
    },

    /// A name is already taken within this node.
    #[error("name already taken: {name}")]
    NameTaken {
        /// The conflicting name.
        name: String,
    },

    /// Missing or invalid authentication.
    #[error("auth error: {message}")]
    AuthError {
        /// Description of the auth failure.
        message: String,
    },

    /// A rate-limit tier's budget has been spent.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded {
        /// Seconds the caller should wait before retrying.
        retry_after_secs: u64,
    },

    /// The SQL executor rejected a statement (parse, constraint, or type
    /// failure).
    #[error("sql error: {message}")]
    SqlError {
        /// The underlying engine's error message.
        message: String,
    },

    /// A replica has not yet applied the write the caller requires.
    #[error("node behind: required position {required}, have {current}")]
    NodeBehind {
        /// The position the caller's read depends on.
        required: u64,
        /// The replica's current position.
        current: u64,
    },

    /// A follower's hash chain verification failed against a claimed
    /// `prevHash`. Fatal for the affected database.
    #[error("hash chain broken for database {database_id} at position {position}")]
    HashChainBroken {
        /// The database whose chain broke.
        database_id: String,
        /// The position at which verification failed.
        position: u64,
    },

    /// A follower detected schema drift against its primary. Fatal for the
    /// affected database.
    #[error("schema mismatch: {message}")]
    SchemaMismatch {
        /// Description of the mismatch.
        message: String,
    },

    /// A dependency (embedded engine, network peer) is transiently down.
    #[error("unavailable: {message}")]
    Unavailable {
        /// Description of what is unavailable.
        message: String,
    },

    /// An unexpected invariant violation.
    #[error("internal error [{correlation_id}]: {message}")]
    Internal {
        /// Description of the violation.
        message: String,
        /// Correlation id for cross-referencing logs.
        correlation_id: String,
    },
}

impl NodeError {
    /// The HTTP status code the adapter should return for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::ValidationError { .. } | Self::NameTaken { .. } => 400,
            Self::AuthError { .. } => 401,
            Self::RateLimitExceeded { .. } => 429,
            Self::SqlError { .. } => 400,
            Self::NodeBehind { .. } => 409,
            Self::HashChainBroken { .. } | Self::SchemaMismatch { .. } => 409,
            Self::Unavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    /// Shorthand for [`NodeError::NotFound`].
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Shorthand for [`NodeError::ValidationError`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// Shorthand for [`NodeError::SqlError`].
    pub fn sql(message: impl Into<String>) -> Self {
        Self::SqlError {
            message: message.into(),
        }
    }

    /// Shorthand for [`NodeError::Internal`], assigning a random
    /// correlation id.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            correlation_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// A malformed WAL record (bad framing, checksum mismatch, or
    /// corrupted payload). Surfaced as [`NodeError::Internal`]: the WAL
    /// format is an internal contract between this node's own writer and
    /// reader, not something a caller's request shape determines.
    pub fn wal_corruption(message: impl Into<String>) -> Self {
        Self::internal(format!("WAL corruption: {}", message.into()))
    }
}

impl From<node_storage::StorageError> for NodeError {
    fn from(err: node_storage::StorageError) -> Self {
        Self::internal(format!("storage error: {err}"))
    }
}

impl From<node_codec::CodecError> for NodeError {
    fn from(err: node_codec::CodecError) -> Self {
        Self::internal(format!("codec error: {err}"))
    }
}

impl From<io::Error> for NodeError {
    fn from(err: io::Error) -> Self {
        Self::Unavailable {
            message: format!("I/O error: {err}"),
        }
    }
}

impl From<rusqlite::Error> for NodeError {
    fn from(err: rusqlite::Error) -> Self {
        Self::SqlError {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec_taxonomy() {
        assert_eq!(NodeError::not_found("db").status_code(), 404);
        assert_eq!(NodeError::validation("bad").status_code(), 400);
        assert_eq!(
            NodeError::AuthError {
                message: "x".into()
            }
            .status_code(),
            401
        );
        assert_eq!(
            NodeError::RateLimitExceeded {
                retry_after_secs: 1
            }
            .status_code(),
            429
        );
        assert_eq!(
            NodeError::NodeBehind {
                required: 5,
                current: 3
            }
            .status_code(),
            409
        );
        assert_eq!(NodeError::internal("oops").status_code(), 500);
    }
}
