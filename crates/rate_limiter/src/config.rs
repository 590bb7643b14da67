//! Tier configuration for the rate limiter (spec.md §4.7).

use std::collections::{HashMap, HashSet};

/// A `(maxRequests, windowMs)` rate-limit policy, identified by name in
/// [`RateLimiterConfig::tiers`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    /// Requests allowed per window.
    pub max_requests: u64,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Optional short-burst allowance above `max_requests`; inert at the
    /// fixed-window algorithm level, carried for callers that layer a
    /// token-bucket check on top (spec.md §1 names "tiered
    /// token-bucket-over-fixed-window").
    pub burst_limit: Option<u64>,
}

impl Tier {
    /// Creates a tier with no burst allowance.
    #[must_use]
    pub const fn new(max_requests: u64, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
            burst_limit: None,
        }
    }

    /// Sets a burst allowance.
    #[must_use]
    pub const fn with_burst_limit(mut self, burst_limit: u64) -> Self {
        self.burst_limit = Some(burst_limit);
        self
    }
}

/// Rate-limiter configuration: tiers, key namespacing, and ingress
/// exemptions (spec.md §4.7).
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Tier applied when a caller doesn't name one.
    pub default_tier: Tier,
    /// Named tiers an HTTP route can select.
    pub tiers: HashMap<String, Tier>,
    /// Prefix applied to every store key, so multiple limiter instances
    /// (or multiple logical limiters sharing one database) don't collide.
    pub key_prefix: String,
    /// Caller IPs exempted from limiting entirely.
    pub skip_ips: HashSet<String>,
    /// Path prefixes exempted from limiting entirely.
    pub skip_paths: Vec<String>,
    /// Cap on entries an in-memory LRU store holds before evicting.
    pub max_cache_size: usize,
    /// How often the background sweeper scans for expired entries.
    pub cleanup_interval_ms: u64,
}

impl RateLimiterConfig {
    /// Creates a configuration with `default_tier` and no named tiers.
    #[must_use]
    pub fn new(default_tier: Tier) -> Self {
        Self {
            default_tier,
            tiers: HashMap::new(),
            key_prefix: "ratelimit:".to_string(),
            skip_ips: HashSet::new(),
            skip_paths: Vec::new(),
            max_cache_size: 10_000,
            cleanup_interval_ms: 60_000,
        }
    }

    /// Registers a named tier.
    #[must_use]
    pub fn with_tier(mut self, name: impl Into<String>, tier: Tier) -> Self {
        self.tiers.insert(name.into(), tier);
        self
    }

    /// Sets the store key prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Exempts an IP from limiting.
    #[must_use]
    pub fn with_skip_ip(mut self, ip: impl Into<String>) -> Self {
        self.skip_ips.insert(ip.into());
        self
    }

    /// Exempts a path prefix from limiting.
    #[must_use]
    pub fn with_skip_path(mut self, prefix: impl Into<String>) -> Self {
        self.skip_paths.push(prefix.into());
        self
    }

    /// Sets the in-memory store's capacity.
    #[must_use]
    pub const fn with_max_cache_size(mut self, size: usize) -> Self {
        self.max_cache_size = size;
        self
    }

    /// Sets the background sweeper's interval.
    #[must_use]
    pub const fn with_cleanup_interval_ms(mut self, interval_ms: u64) -> Self {
        self.cleanup_interval_ms = interval_ms;
        self
    }

    /// Whether `path` should bypass limiting entirely.
    #[must_use]
    pub fn path_is_skipped(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Whether `ip` should bypass limiting entirely.
    #[must_use]
    pub fn ip_is_skipped(&self, ip: &str) -> bool {
        self.skip_ips.contains(ip)
    }

    /// Resolves a tier by name, falling back to the default tier when
    /// `name` is `None`.
    pub fn resolve_tier(&self, name: Option<&str>) -> crate::error::RateLimiterResult<&Tier> {
        match name {
            None => Ok(&self.default_tier),
            Some(name) => self
                .tiers
                .get(name)
                .ok_or_else(|| crate::error::RateLimiterError::UnknownTier(name.to_string())),
        }
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::new(Tier::new(100, 60_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_default_and_named_tiers() {
        let config = RateLimiterConfig::new(Tier::new(10, 1000)).with_tier("strict", Tier::new(1, 1000));
        assert_eq!(config.resolve_tier(None).unwrap().max_requests, 10);
        assert_eq!(config.resolve_tier(Some("strict")).unwrap().max_requests, 1);
        assert!(config.resolve_tier(Some("missing")).is_err());
    }

    #[test]
    fn skip_lists() {
        let config = RateLimiterConfig::default()
            .with_skip_ip("127.0.0.1")
            .with_skip_path("/health");
        assert!(config.ip_is_skipped("127.0.0.1"));
        assert!(!config.ip_is_skipped("1.2.3.4"));
        assert!(config.path_is_skipped("/health/live"));
        assert!(!config.path_is_skipped("/query"));
    }
}
