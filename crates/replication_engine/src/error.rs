//! Error types for the replication engine.

use node_core::DatabaseId;
use thiserror::Error;

/// Result type for replication operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors that can occur while a follower pulls and applies a primary's WAL.
#[derive(Error, Debug)]
pub enum ReplicationError {
    /// Network or transport failure reaching the primary.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the caller should retry (vs treat as fatal).
        retryable: bool,
    },

    /// A pulled entry failed to decode off the wire.
    #[error("protocol error: {0}")]
    Protocol(#[from] replication_protocol::ProtocolError),

    /// The local node rejected an apply or lookup. Wraps
    /// [`node_core::NodeError::HashChainBroken`] and
    /// [`node_core::NodeError::SchemaMismatch`] among others — both are
    /// fatal for the affected database (spec.md §4.5).
    #[error(transparent)]
    Node(#[from] node_core::NodeError),

    /// The follower-database state machine is already `faulted` and
    /// requires operator intervention before it will pull again.
    #[error("database {database_id} is faulted and will not resume automatically")]
    Faulted {
        /// The faulted database.
        database_id: DatabaseId,
    },
}

impl ReplicationError {
    /// Creates a retryable transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether this error should be retried with backoff, as opposed to
    /// immediately faulting the follower-database state machine.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            Self::Protocol(_) => false,
            Self::Node(err) => matches!(err, node_core::NodeError::Unavailable { .. }),
            Self::Faulted { .. } => false,
        }
    }

    /// Whether this error is one of the two fatal follower conditions
    /// spec.md §4.5 names explicitly (`HashChainBroken`, `SchemaMismatch`).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Node(node_core::NodeError::HashChainBroken { .. } | node_core::NodeError::SchemaMismatch { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_errors_are_retryable() {
        assert!(ReplicationError::transport("timeout").is_retryable());
    }

    #[test]
    fn hash_chain_broken_is_fatal() {
        let err = ReplicationError::Node(node_core::NodeError::HashChainBroken {
            database_id: "x".to_string(),
            position: 5,
        });
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }
}
