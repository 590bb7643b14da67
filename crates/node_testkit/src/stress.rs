//! Concurrency stress helpers: hammer a [`node_core::Node`] with concurrent
//! writers and assert the WAL stays dense and hash-chained (spec.md §4.2's
//! single-writer-lock invariant), and hammer a [`rate_limiter::RateLimiter`]
//! with concurrent callers at one key and assert the fixed window never
//! overcounts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use node_core::{DatabaseId, ExecuteRequest, Node};
use rate_limiter::{RateLimitStore, RateLimiter};

/// Result of a stress run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations attempted.
    pub total_ops: usize,
    /// Operations that returned `Ok`.
    pub successful_ops: usize,
    /// Operations that returned `Err`.
    pub failed_ops: usize,
    /// Wall-clock duration of the run.
    pub duration: Duration,
    /// Throughput in operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Builds a result from raw counts.
    #[must_use]
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };
        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }
}

/// Configuration shared by the stress helpers below.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations per thread.
    pub operations_per_thread: usize,
    /// Number of concurrent threads.
    pub threads: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations_per_thread: 200,
            threads: 8,
        }
    }
}

/// Hammers `node` with concurrent single-statement writes against
/// `database_id` from `config.threads` OS threads, then asserts the
/// resulting WAL has exactly one entry per successful write, in a dense
/// run of positions with no gaps and an unbroken hash chain — the
/// single-writer-lock invariant must hold even under contention.
pub fn stress_concurrent_writes(node: Arc<Node>, database_id: DatabaseId, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let node = Arc::clone(&node);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let ops = config.operations_per_thread;
            thread::spawn(move || {
                for i in 0..ops {
                    let value = (t * ops + i) as i64;
                    let result = node.execute(ExecuteRequest {
                        database_id,
                        sql: "INSERT INTO stress (v) VALUES (?1)".to_string(),
                        params: vec![node_codec::Value::Integer(value)],
                        required_wal_position: None,
                    });
                    match result {
                        Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                        Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("stress writer thread panicked");
    }
    let duration = start.elapsed();

    let result = StressTestResult::new(successful.load(Ordering::Relaxed), failed.load(Ordering::Relaxed), duration);

    let (entries, current_position) = node
        .get_wal_entries(database_id, 1, usize::MAX)
        .map(|range| (range.entries, range.current_position))
        .expect("failed to read back wal after stress run");
    assert_eq!(
        entries.len() as u64,
        current_position,
        "wal position must equal entry count: concurrent writers produced a gap"
    );
    for window in entries.windows(2) {
        assert_eq!(window[0].position + 1, window[1].position, "wal positions must be dense");
        assert_eq!(window[1].prev_hash, window[0].hash, "wal hash chain must be unbroken under contention");
    }

    result
}

/// Hammers a shared [`RateLimiter`] at one key from `config.threads`
/// threads and asserts the number of allowed requests never exceeds the
/// tier's budget, regardless of how the threads interleave.
pub fn stress_rate_limiter_contention<S>(limiter: Arc<RateLimiter<S>>, key: &str, config: &StressConfig) -> StressTestResult
where
    S: RateLimitStore + Send + Sync + 'static,
{
    let allowed = Arc::new(AtomicUsize::new(0));
    let denied = Arc::new(AtomicUsize::new(0));
    let key = key.to_string();

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let limiter = Arc::clone(&limiter);
            let allowed = Arc::clone(&allowed);
            let denied = Arc::clone(&denied);
            let key = key.clone();
            let ops = config.operations_per_thread;
            thread::spawn(move || {
                for _ in 0..ops {
                    let result = limiter.check(&key, None).expect("rate limiter check failed");
                    if result.allowed {
                        allowed.fetch_add(1, Ordering::Relaxed);
                    } else {
                        denied.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("stress limiter thread panicked");
    }
    let duration = start.elapsed();

    let limit = limiter.config().default_tier.max_requests;
    let allowed_count = allowed.load(Ordering::Relaxed);
    assert!(
        allowed_count as u64 <= limit,
        "rate limiter overcounted under contention: {allowed_count} allowed against a budget of {limit}"
    );

    StressTestResult::new(allowed_count, denied.load(Ordering::Relaxed), duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::TestNode;
    use rate_limiter::{LruStore, RateLimiterConfig, Tier};

    #[test]
    fn concurrent_writes_leave_a_dense_hash_chain() {
        let node = TestNode::memory();
        let id = node.create_database("stress", "CREATE TABLE stress (v INTEGER)");
        let config = StressConfig { operations_per_thread: 25, threads: 6 };

        let result = stress_concurrent_writes(node.node.clone(), id, &config);
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, config.operations_per_thread * config.threads);
    }

    #[test]
    fn rate_limiter_never_overcounts_under_contention() {
        let limiter = Arc::new(RateLimiter::new(
            LruStore::new(1_000, 60_000),
            RateLimiterConfig::new(Tier::new(50, 60_000)),
        ));
        let config = StressConfig { operations_per_thread: 20, threads: 8 };

        let result = stress_rate_limiter_contention(limiter, "contended-key", &config);
        assert!(result.successful_ops as u64 <= 50);
        assert_eq!(result.successful_ops + result.failed_ops, config.operations_per_thread * config.threads);
    }
}
