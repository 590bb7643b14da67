//! Shared state behind the adapter's own routes and its rate-limit
//! middleware (spec.md §4.8).

use std::collections::HashMap;
use std::sync::Arc;

use node_core::Node;
use parking_lot::RwLock;
use rate_limiter::RateLimiting;
use relay_store::RelayServerState;

use crate::lag::ReplicationLagSource;

/// Counts of requests the rate-limit middleware has denied, by tier name,
/// since process start. Tracked here (not inside `rate_limiter`) because
/// only the HTTP layer observes which check outcome became a `429`.
#[derive(Debug, Default)]
pub struct DeniedCounters {
    by_tier: RwLock<HashMap<String, u64>>,
}

impl DeniedCounters {
    /// An empty counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one denial against `tier`.
    pub fn record(&self, tier: &str) {
        *self.by_tier.write().entry(tier.to_string()).or_insert(0) += 1;
    }

    /// A snapshot of every tier's denial count so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, u64)> {
        self.by_tier.read().iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}

/// Shared state behind every route `http_adapter` owns directly
/// (`/query`, `/batch`, `/health`, `/metrics`) and the rate-limit
/// middleware layered over the whole router.
pub struct AppState {
    pub(crate) node: Arc<Node>,
    pub(crate) relay: Option<Arc<RelayServerState>>,
    pub(crate) rate_limiter: Option<Arc<dyn RateLimiting>>,
    pub(crate) replication_lag: Option<Arc<dyn ReplicationLagSource>>,
    pub(crate) denied_counters: DeniedCounters,
}

impl AppState {
    /// Builds state over `node`. `relay`, `rate_limiter`, and
    /// `replication_lag` are optional so a node that hosts no relay
    /// traffic, accepts no replicas, or runs unlimited still reports
    /// accurate `/health` and `/metrics` output.
    #[must_use]
    pub fn new(
        node: Arc<Node>,
        relay: Option<Arc<RelayServerState>>,
        rate_limiter: Option<Arc<dyn RateLimiting>>,
        replication_lag: Option<Arc<dyn ReplicationLagSource>>,
    ) -> Self {
        Self {
            node,
            relay,
            rate_limiter,
            replication_lag,
            denied_counters: DeniedCounters::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_counters_accumulate_per_tier() {
        let counters = DeniedCounters::new();
        counters.record("default");
        counters.record("default");
        counters.record("strict");
        let snapshot: HashMap<_, _> = counters.snapshot().into_iter().collect();
        assert_eq!(snapshot["default"], 2);
        assert_eq!(snapshot["strict"], 1);
    }
}
