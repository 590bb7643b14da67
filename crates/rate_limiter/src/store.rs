//! The capability-set trait rate-limit stores implement, per spec.md §9's
//! redesign guidance (inheritance between store variants replaced by one
//! trait, alternative implementations chosen at construction time).

use crate::error::RateLimiterResult;

/// A fixed-window counter's state (spec.md §3 "Rate-Limit Entry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowState {
    /// Requests observed in the current window.
    pub count: u64,
    /// Wall-clock milliseconds at which the window expires.
    pub reset_at: u64,
}

/// Capability set a rate-limit store exposes, consumed by
/// [`crate::RateLimiter`] regardless of whether the store is in-memory or
/// database-backed.
pub trait RateLimitStore: Send + Sync {
    /// Reads a key's current window, if any.
    fn get(&self, key: &str) -> RateLimiterResult<Option<WindowState>>;

    /// Overwrites a key's window state.
    fn set(&self, key: &str, state: WindowState) -> RateLimiterResult<()>;

    /// Removes a key's window state.
    fn delete(&self, key: &str) -> RateLimiterResult<()>;

    /// Removes every key's window state.
    fn clear(&self) -> RateLimiterResult<()>;

    /// Atomically performs the fixed-window algorithm's steps 1–4
    /// (spec.md §4.7): looks up `key`, starts a new window if absent or
    /// expired, otherwise increments, and returns the resulting state.
    /// Implementations must serialize this against concurrent callers for
    /// the same key so bursts are never undercounted.
    fn maybe_increment(&self, key: &str, now_ms: u64, window_ms: u64) -> RateLimiterResult<WindowState>;

    /// Evicts every entry whose window has expired as of `now_ms`.
    /// Returns the number of entries removed. Called periodically by a
    /// store's background sweeper; safe to call concurrently with
    /// [`RateLimitStore::maybe_increment`].
    fn cleanup(&self, now_ms: u64) -> RateLimiterResult<u64>;

    /// Number of keys currently tracked, for `/health` stats.
    fn len(&self) -> RateLimiterResult<usize>;
}

impl<T: RateLimitStore + ?Sized> RateLimitStore for std::sync::Arc<T> {
    fn get(&self, key: &str) -> RateLimiterResult<Option<WindowState>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, state: WindowState) -> RateLimiterResult<()> {
        (**self).set(key, state)
    }

    fn delete(&self, key: &str) -> RateLimiterResult<()> {
        (**self).delete(key)
    }

    fn clear(&self) -> RateLimiterResult<()> {
        (**self).clear()
    }

    fn maybe_increment(&self, key: &str, now_ms: u64, window_ms: u64) -> RateLimiterResult<WindowState> {
        (**self).maybe_increment(key, now_ms, window_ms)
    }

    fn cleanup(&self, now_ms: u64) -> RateLimiterResult<u64> {
        (**self).cleanup(now_ms)
    }

    fn len(&self) -> RateLimiterResult<usize> {
        (**self).len()
    }
}
