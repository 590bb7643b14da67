//! Tiered fixed-window rate limiter (spec.md §4.7).

use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::RateLimiterConfig;
use crate::error::RateLimiterResult;
use crate::store::RateLimitStore;

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckResult {
    /// Whether this call is within budget.
    pub allowed: bool,
    /// Requests observed in the current window, including this call.
    pub current: u64,
    /// The tier's request budget.
    pub limit: u64,
    /// Requests remaining in the current window (0 when denied).
    pub remaining: u64,
    /// Seconds until the window resets.
    pub reset_in_seconds: u64,
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// Decides whether an operation at a key is within its tier's budget,
/// generic over the store so an in-memory LRU and a database-backed store
/// are interchangeable (spec.md §9: capability-set trait, not inheritance).
pub struct RateLimiter<S> {
    store: S,
    config: RateLimiterConfig,
}

impl<S: RateLimitStore> RateLimiter<S> {
    /// Builds a limiter over `store` with `config`.
    #[must_use]
    pub const fn new(store: S, config: RateLimiterConfig) -> Self {
        Self { store, config }
    }

    /// The limiter's configuration.
    #[must_use]
    pub const fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Checks and records one request at `key` against `tier` (or the
    /// default tier if `None`), per the fixed-window algorithm in
    /// spec.md §4.7.
    pub fn check(&self, key: &str, tier: Option<&str>) -> RateLimiterResult<CheckResult> {
        let tier = self.config.resolve_tier(tier)?;
        let prefixed_key = format!("{}{key}", self.config.key_prefix);
        let now = now_ms();

        let window = self.store.maybe_increment(&prefixed_key, now, tier.window_ms)?;
        let allowed = window.count <= tier.max_requests;
        let remaining = tier.max_requests.saturating_sub(window.count);
        let reset_in_seconds = window.reset_at.saturating_sub(now).div_ceil(1000);

        Ok(CheckResult {
            allowed,
            current: window.count,
            limit: tier.max_requests,
            remaining,
            reset_in_seconds,
        })
    }

    /// Clears a key's window, so its next [`RateLimiter::check`] starts
    /// fresh.
    pub fn reset(&self, key: &str) -> RateLimiterResult<()> {
        let prefixed_key = format!("{}{key}", self.config.key_prefix);
        self.store.delete(&prefixed_key)
    }

    /// Number of keys the store is currently tracking.
    pub fn store_size(&self) -> RateLimiterResult<usize> {
        self.store.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tier;
    use crate::memory::LruStore;
    use std::sync::Arc;

    fn limiter(max_requests: u64, window_ms: u64) -> RateLimiter<Arc<LruStore>> {
        RateLimiter::new(LruStore::new(1_000, 60_000), RateLimiterConfig::new(Tier::new(max_requests, window_ms)))
    }

    #[tokio::test]
    async fn burst_up_to_limit_is_allowed_then_denied() {
        let limiter = limiter(3, 60_000);
        assert!(limiter.check("k", None).unwrap().allowed);
        assert!(limiter.check("k", None).unwrap().allowed);
        assert!(limiter.check("k", None).unwrap().allowed);
        let fourth = limiter.check("k", None).unwrap();
        assert!(!fourth.allowed);
        assert_eq!(fourth.remaining, 0);
    }

    #[tokio::test]
    async fn reset_then_check_restarts_at_one() {
        let limiter = limiter(3, 60_000);
        limiter.check("k", None).unwrap();
        limiter.check("k", None).unwrap();
        limiter.reset("k").unwrap();
        let result = limiter.check("k", None).unwrap();
        assert!(result.allowed);
        assert_eq!(result.current, 1);
    }

    #[tokio::test]
    async fn unknown_tier_is_an_error() {
        let limiter = limiter(3, 60_000);
        assert!(limiter.check("k", Some("bogus")).is_err());
    }
}
