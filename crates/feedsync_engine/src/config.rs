//! Configuration for the sync engine.

use std::time::Duration;

/// Configuration for sync operations.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Upper bound on every remote call.
    pub remote_timeout: Duration,
    /// Backoff between failed replay cycles.
    pub retry: RetryConfig,
    /// Interval for background reconciliation, disabled when `None`.
    pub reconcile_interval: Option<Duration>,
    /// How long remote-confirmed tombstones are kept. `None` keeps them forever.
    pub tombstone_retention: Option<Duration>,
    /// Whether a successful read writes the merged result back to the local cache.
    pub refresh_cache_on_read: bool,
}

impl SyncConfig {
    /// Creates a configuration with the default settings.
    pub fn new() -> Self {
        Self {
            remote_timeout: Duration::from_secs(6),
            retry: RetryConfig::default(),
            reconcile_interval: None,
            tombstone_retention: None,
            refresh_cache_on_read: true,
        }
    }

    /// Sets the remote call timeout.
    pub fn with_remote_timeout(mut self, timeout: Duration) -> Self {
        self.remote_timeout = timeout;
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Enables periodic reconciliation.
    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = Some(interval);
        self
    }

    /// Enables tombstone compaction after `retention`.
    pub fn with_tombstone_retention(mut self, retention: Duration) -> Self {
        self.tombstone_retention = Some(retention);
        self
    }

    /// Controls the cache write-back after reads.
    pub fn with_cache_refresh(mut self, enabled: bool) -> Self {
        self.refresh_cache_on_read = enabled;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Initial delay between retries.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Creates a retry configuration with the given bounds.
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier: 2.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the backoff multiplier.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enables up to 25% jitter on every delay.
    pub fn with_jitter(mut self, enabled: bool) -> Self {
        self.add_jitter = enabled;
        self
    }

    /// Calculates the delay after `attempt` consecutive failures.
    ///
    /// Zero failures means no delay; the first failure waits `initial_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let delay_secs = base_delay.min(self.max_delay.as_secs_f64());

        if self.add_jitter {
            let jitter = delay_secs * 0.25 * rand_jitter();
            Duration::from_secs_f64(delay_secs + jitter)
        } else {
            Duration::from_secs_f64(delay_secs)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

/// Cheap time-derived jitter in `[0, 1)`.
fn rand_jitter() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    f64::from(nanos % 1000) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.remote_timeout, Duration::from_secs(6));
        assert!(config.reconcile_interval.is_none());
        assert!(config.tombstone_retention.is_none());
        assert!(config.refresh_cache_on_read);
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_remote_timeout(Duration::from_millis(500))
            .with_reconcile_interval(Duration::from_secs(30))
            .with_tombstone_retention(Duration::from_secs(86_400))
            .with_cache_refresh(false);

        assert_eq!(config.remote_timeout, Duration::from_millis(500));
        assert_eq!(config.reconcile_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.tombstone_retention, Some(Duration::from_secs(86_400)));
        assert!(!config.refresh_cache_on_read);
    }

    #[test]
    fn retry_delay_doubles() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn retry_delay_respects_max() {
        let config = RetryConfig::default().with_max_delay(Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(u32::MAX), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let config = RetryConfig::default().with_jitter(true);
        let delay = config.delay_for_attempt(2);
        assert!(delay >= Duration::from_secs(2));
        assert!(delay <= Duration::from_millis(2500));
    }
}
