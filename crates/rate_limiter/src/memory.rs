//! In-memory LRU rate-limit store (spec.md §4.7).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::RateLimiterResult;
use crate::store::{RateLimitStore, WindowState};

struct Inner {
    entries: HashMap<String, WindowState>,
    max_size: usize,
}

impl Inner {
    /// Makes room for a novel key: first drops everything already expired,
    /// then — if still at capacity — drops the oldest 10% by `reset_at`
    /// (spec.md §4.7).
    fn evict_for_insert(&mut self, now_ms: u64) {
        self.entries.retain(|_, state| state.reset_at >= now_ms);
        if self.entries.len() < self.max_size {
            return;
        }
        let evict_count = (self.entries.len() / 10).max(1);
        let mut by_reset: Vec<(String, u64)> =
            self.entries.iter().map(|(k, v)| (k.clone(), v.reset_at)).collect();
        by_reset.sort_by_key(|(_, reset_at)| *reset_at);
        for (key, _) in by_reset.into_iter().take(evict_count) {
            self.entries.remove(&key);
        }
    }
}

/// In-memory LRU-capped rate-limit store, with a lifecycle-tied background
/// sweeper that periodically evicts expired entries.
pub struct LruStore {
    inner: Mutex<Inner>,
    shutdown: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl LruStore {
    /// Creates a store capped at `max_size` entries and starts its
    /// background sweeper, which wakes every `cleanup_interval_ms`.
    #[must_use]
    pub fn new(max_size: usize, cleanup_interval_ms: u64) -> Arc<Self> {
        let (tx, rx) = watch::channel(false);
        let store = Arc::new(Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                max_size,
            }),
            shutdown: tx,
            sweeper: Mutex::new(None),
        });

        let sweeper_store = Arc::clone(&store);
        let handle = tokio::spawn(async move {
            sweeper_store.run_sweeper(rx, cleanup_interval_ms).await;
        });
        *store.sweeper.lock() = Some(handle);
        store
    }

    async fn run_sweeper(&self, mut shutdown: watch::Receiver<bool>, interval_ms: u64) {
        let interval = std::time::Duration::from_millis(interval_ms.max(1));
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    let now = now_ms();
                    match self.cleanup(now) {
                        Ok(removed) if removed > 0 => debug!(removed, "rate limiter sweeper evicted expired entries"),
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "rate limiter sweeper failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Stops the background sweeper. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for LruStore {
    fn drop(&mut self) {
        self.stop();
    }
}

impl RateLimitStore for LruStore {
    fn get(&self, key: &str) -> RateLimiterResult<Option<WindowState>> {
        Ok(self.inner.lock().entries.get(key).copied())
    }

    fn set(&self, key: &str, state: WindowState) -> RateLimiterResult<()> {
        let mut inner = self.inner.lock();
        if !inner.entries.contains_key(key) && inner.entries.len() >= inner.max_size {
            let now = now_ms();
            inner.evict_for_insert(now);
        }
        inner.entries.insert(key.to_string(), state);
        Ok(())
    }

    fn delete(&self, key: &str) -> RateLimiterResult<()> {
        self.inner.lock().entries.remove(key);
        Ok(())
    }

    fn clear(&self) -> RateLimiterResult<()> {
        self.inner.lock().entries.clear();
        Ok(())
    }

    fn maybe_increment(&self, key: &str, now_ms: u64, window_ms: u64) -> RateLimiterResult<WindowState> {
        let mut inner = self.inner.lock();

        if let Some(state) = inner.entries.get_mut(key) {
            if state.reset_at < now_ms {
                state.count = 1;
                state.reset_at = now_ms + window_ms;
            } else {
                state.count += 1;
            }
            return Ok(*state);
        }

        if inner.entries.len() >= inner.max_size {
            inner.evict_for_insert(now_ms);
        }
        let state = WindowState {
            count: 1,
            reset_at: now_ms + window_ms,
        };
        inner.entries.insert(key.to_string(), state);
        Ok(state)
    }

    fn cleanup(&self, now_ms: u64) -> RateLimiterResult<u64> {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, state| state.reset_at >= now_ms);
        Ok((before - inner.entries.len()) as u64)
    }

    fn len(&self) -> RateLimiterResult<usize> {
        Ok(self.inner.lock().entries.len())
    }
}

fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fresh_key_starts_a_window() {
        let store = LruStore::new(100, 60_000);
        let state = store.maybe_increment("k", 1_000, 60_000).unwrap();
        assert_eq!(state.count, 1);
        assert_eq!(state.reset_at, 61_000);
    }

    #[tokio::test]
    async fn same_window_increments() {
        let store = LruStore::new(100, 60_000);
        store.maybe_increment("k", 1_000, 60_000).unwrap();
        store.maybe_increment("k", 1_100, 60_000).unwrap();
        let state = store.maybe_increment("k", 1_200, 60_000).unwrap();
        assert_eq!(state.count, 3);
    }

    #[tokio::test]
    async fn expired_window_resets() {
        let store = LruStore::new(100, 60_000);
        store.maybe_increment("k", 1_000, 1_000).unwrap();
        let state = store.maybe_increment("k", 5_000, 1_000).unwrap();
        assert_eq!(state.count, 1);
    }

    #[tokio::test]
    async fn overflow_evicts_expired_then_oldest_tenth() {
        let store = LruStore::new(10, 60_000);
        for i in 0..10 {
            store.maybe_increment(&format!("k{i}"), 1_000 + i, 60_000).unwrap();
        }
        assert_eq!(store.len().unwrap(), 10);
        let state = store.maybe_increment("k-new", 2_000, 60_000).unwrap();
        assert_eq!(state.count, 1);
        assert!(store.len().unwrap() <= 10);
    }

    #[tokio::test]
    async fn cleanup_removes_only_expired() {
        let store = LruStore::new(100, 60_000);
        store.maybe_increment("old", 1_000, 1_000).unwrap();
        store.maybe_increment("fresh", 10_000, 60_000).unwrap();
        let removed = store.cleanup(5_000).unwrap();
        assert_eq!(removed, 1);
        assert!(store.get("old").unwrap().is_none());
        assert!(store.get("fresh").unwrap().is_some());
    }
}
