//! CLI-local error taxonomy, distinguishing spec.md §6's three exit codes
//! (`0` clean, `1` unrecoverable, `2` configuration error) from the single
//! flat `thiserror` enums each library crate exposes.

use thiserror::Error;

/// Result type for CLI command bodies.
pub type CliResult<T> = Result<T, CliError>;

/// Errors a subcommand can fail with, tagged by the exit code `main`
/// should report for it.
#[derive(Debug, Error)]
pub enum CliError {
    /// Bad flags, a missing required argument, or a corrupt config/identity
    /// file. Exit code `2`.
    #[error("configuration error: {0}")]
    Config(String),

    /// Everything else: node/storage/replication/relay/rate-limiter
    /// failures, I/O errors. Exit code `1`.
    #[error(transparent)]
    Node(#[from] node_core::NodeError),

    /// See [`CliError::Node`].
    #[error(transparent)]
    Storage(#[from] node_storage::StorageError),

    /// See [`CliError::Node`].
    #[error(transparent)]
    RateLimiter(#[from] rate_limiter::RateLimiterError),

    /// See [`CliError::Node`].
    #[error(transparent)]
    Relay(#[from] relay_store::RelayError),

    /// See [`CliError::Node`].
    #[error(transparent)]
    Replication(#[from] replication_engine::ReplicationError),

    /// See [`CliError::Node`].
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// The process exit code spec.md §6 assigns to this failure.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            _ => 1,
        }
    }
}
