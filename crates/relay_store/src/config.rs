//! Tuning knobs for the relay store (spec.md §4.3, §4.6).

use std::time::Duration;

/// Configuration for [`crate::RelayStore`].
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How far into the past an envelope's `timestamp` may lie before
    /// it's rejected as too old. Default 5 minutes (spec.md §4.6 step 2).
    pub max_age: Duration,
    /// How far into the future an envelope's `timestamp` may lie before
    /// it's rejected as too new. Default 30 seconds (spec.md §4.6 step 2).
    pub max_skew: Duration,
    /// Maximum serialized envelope size. Default 1 MiB (spec.md §4.6
    /// step 4).
    pub max_envelope_bytes: usize,
    /// Maximum concurrent WebSocket subscribers (spec.md §6). A
    /// subscribe attempt beyond this is refused with `server at capacity`.
    pub max_subscribers: usize,
    /// How stale an authentication challenge's timestamp may be before
    /// it's rejected (`x-jeju-timestamp`, and the WebSocket subscribe
    /// handshake).
    pub auth_window: Duration,
}

impl RelayConfig {
    /// Creates a configuration with spec.md's documented defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the freshness window's lower bound.
    #[must_use]
    pub const fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Overrides the freshness window's upper bound.
    #[must_use]
    pub const fn with_max_skew(mut self, max_skew: Duration) -> Self {
        self.max_skew = max_skew;
        self
    }

    /// Overrides the per-envelope size ceiling.
    #[must_use]
    pub const fn with_max_envelope_bytes(mut self, bytes: usize) -> Self {
        self.max_envelope_bytes = bytes;
        self
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(5 * 60),
            max_skew: Duration::from_secs(30),
            max_envelope_bytes: 1024 * 1024,
            max_subscribers: 10_000,
            auth_window: Duration::from_secs(5 * 60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = RelayConfig::default();
        assert_eq!(config.max_age, Duration::from_secs(300));
        assert_eq!(config.max_skew, Duration::from_secs(30));
        assert_eq!(config.max_envelope_bytes, 1024 * 1024);
        assert_eq!(config.max_subscribers, 10_000);
    }
}
