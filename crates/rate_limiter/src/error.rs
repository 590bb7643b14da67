//! Error types for the rate limiter.

use thiserror::Error;

/// Result type for rate-limiter operations.
pub type RateLimiterResult<T> = Result<T, RateLimiterError>;

/// Errors the rate limiter and its stores can raise.
#[derive(Debug, Error)]
pub enum RateLimiterError {
    /// The database-backed store's query against `node_core` failed.
    #[error("store error: {0}")]
    Store(#[from] node_core::NodeError),

    /// A named tier was requested that is not in
    /// [`crate::RateLimiterConfig::tiers`] and is not the default tier.
    #[error("unknown rate limit tier: {0}")]
    UnknownTier(String),

    /// [`crate::get_rate_limiter`] was called before
    /// [`crate::init_rate_limiter`] installed a singleton.
    #[error("rate limiter not initialized")]
    NotInitialized,
}
