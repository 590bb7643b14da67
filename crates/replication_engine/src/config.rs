//! Tuning knobs for the follower pull loop.

use std::time::Duration;

use rand::Rng;

/// Configuration for a single database's replication coordinator.
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// How often to poll the primary for new entries while `live`.
    pub poll_interval: Duration,
    /// Maximum entries requested per pull.
    pub pull_batch_size: usize,
    /// Request timeout against the primary.
    pub timeout: Duration,
    /// Retry/backoff policy for transport failures.
    pub retry: RetryConfig,
}

impl ReplicationConfig {
    /// Starts from defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the pull batch size.
    #[must_use]
    pub fn with_pull_batch_size(mut self, size: usize) -> Self {
        self.pull_batch_size = size;
        self
    }

    /// Overrides the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            pull_batch_size: 500,
            timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff with jitter for transport retries.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of consecutive failures tolerated before the
    /// database's state machine transitions to `faulted`.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Ceiling the backoff will not exceed.
    pub max_delay: Duration,
    /// Multiplier applied to the delay on each consecutive failure.
    pub backoff_multiplier: f64,
    /// Whether to add up to 25% random jitter to the computed delay, so
    /// that many followers recovering from the same primary outage don't
    /// all retry in lockstep.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with `max_attempts` consecutive
    /// failures tolerated.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Calculates the delay before retry attempt number `attempt`
    /// (1-indexed; `0` means "not yet failed" and returns no delay).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            let jitter = delay_secs * 0.25 * rand::thread_rng().gen_range(0.0..1.0);
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }

    /// Whether `attempt` consecutive failures should fault the database.
    #[must_use]
    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(10)
    }
}
