//! Process-wide singleton facade (spec.md §4.7), redesigned per spec.md §9:
//! the limiter itself is an explicit handle passed through constructors;
//! this module is a thin `install`/`get`/`reset` wrapper intended to be
//! touched only at a binary's entry point (`node_cli`), never by library
//! code such as `relay_store` or `http_adapter`, which should take an
//! `Arc<dyn RateLimiting>` directly instead of reaching for the global.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::RateLimiterConfig;
use crate::error::{RateLimiterError, RateLimiterResult};
use crate::limiter::CheckResult;

/// Object-safe view over [`crate::RateLimiter`], so the singleton facade
/// and any caller that only has a trait object can still `check`/`reset`
/// without naming a concrete store type.
pub trait RateLimiting: Send + Sync {
    /// See [`crate::RateLimiter::check`].
    fn check(&self, key: &str, tier: Option<&str>) -> RateLimiterResult<CheckResult>;
    /// See [`crate::RateLimiter::reset`].
    fn reset(&self, key: &str) -> RateLimiterResult<()>;
    /// The limiter's configuration.
    fn config(&self) -> &RateLimiterConfig;
    /// See [`crate::RateLimiter::store_size`].
    fn store_size(&self) -> RateLimiterResult<usize>;
}

impl<S: crate::store::RateLimitStore> RateLimiting for crate::RateLimiter<S> {
    fn check(&self, key: &str, tier: Option<&str>) -> RateLimiterResult<CheckResult> {
        crate::RateLimiter::check(self, key, tier)
    }

    fn reset(&self, key: &str) -> RateLimiterResult<()> {
        crate::RateLimiter::reset(self, key)
    }

    fn config(&self) -> &RateLimiterConfig {
        crate::RateLimiter::config(self)
    }

    fn store_size(&self) -> RateLimiterResult<usize> {
        crate::RateLimiter::store_size(self)
    }
}

static INSTANCE: RwLock<Option<Arc<dyn RateLimiting>>> = RwLock::new(None);

/// Installs the process-wide rate limiter, stopping and dropping any
/// previously installed instance.
pub fn init_rate_limiter(limiter: Arc<dyn RateLimiting>) {
    *INSTANCE.write() = Some(limiter);
}

/// Returns the installed rate limiter, or [`RateLimiterError::NotInitialized`]
/// if [`init_rate_limiter`] has not been called.
pub fn get_rate_limiter() -> RateLimiterResult<Arc<dyn RateLimiting>> {
    INSTANCE.read().clone().ok_or(RateLimiterError::NotInitialized)
}

/// Stops and clears the process-wide rate limiter.
pub fn reset_rate_limiter() {
    *INSTANCE.write() = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tier;
    use crate::memory::LruStore;
    use crate::RateLimiter;

    #[tokio::test]
    async fn get_before_init_is_not_initialized() {
        reset_rate_limiter();
        assert!(matches!(get_rate_limiter(), Err(RateLimiterError::NotInitialized)));
    }

    #[tokio::test]
    async fn install_then_get_then_reset() {
        reset_rate_limiter();
        let limiter = RateLimiter::new(LruStore::new(10, 60_000), RateLimiterConfig::new(Tier::new(5, 1_000)));
        init_rate_limiter(Arc::new(limiter));

        let handle = get_rate_limiter().unwrap();
        assert!(handle.check("k", None).unwrap().allowed);

        reset_rate_limiter();
        assert!(get_rate_limiter().is_err());
    }
}
