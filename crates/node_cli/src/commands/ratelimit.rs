//! `node ratelimit check|reset` (spec.md §4.7): exercises the process-wide
//! singleton facade directly, the one place outside a `serve` process this
//! facade is meant to be touched (`rate_limiter::singleton`'s own doc
//! comment reserves it for a binary's entry point).

use rate_limiter::{init_rate_limiter, LruStore, RateLimiter, RateLimiterConfig, Tier};

use crate::error::CliResult;

fn install_transient_limiter(max_requests: u64, window_ms: u64) {
    let store = LruStore::new(10_000, 60_000);
    let limiter = RateLimiter::new(store, RateLimiterConfig::new(Tier::new(max_requests, window_ms)));
    init_rate_limiter(std::sync::Arc::new(limiter));
}

/// `node ratelimit check --key KEY --max N --window-ms W`: runs one
/// `check` against a fresh in-memory limiter, for operators validating a
/// tier's budget shape without standing up a whole node.
pub fn check(key: &str, max_requests: u64, window_ms: u64) -> CliResult<()> {
    install_transient_limiter(max_requests, window_ms);
    let limiter = rate_limiter::get_rate_limiter()?;
    let result = limiter.check(key, None)?;

    println!("allowed:   {}", result.allowed);
    println!("current:   {}", result.current);
    println!("limit:     {}", result.limit);
    println!("remaining: {}", result.remaining);
    println!("resetIn:   {}s", result.reset_in_seconds);

    rate_limiter::reset_rate_limiter();
    Ok(())
}
