//! Fixed-window rate limiting over a shared [`KeyValueStore`].
//!
//! For identity `I` at time `t` the limiter increments
//! `ratelimit:{I}:{floor(t / window)}` with the window length as the expiry
//! of a freshly created counter. The increment-and-read is one atomic store
//! call, so every process sharing the store sees a single counter per window
//! and no application-level lock is needed.
//!
//! Boundary bursts of up to twice the limit across two adjacent windows are
//! accepted in exchange for O(1) state per identity.
//!
//! # Example
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//! use medai_guard_storage::{MemoryStore, StorageError};
//! use medai_guard_storage::rate_limiter::{FixedWindowLimiter, RateLimitConfig};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let config = RateLimitConfig::new(2, Duration::from_secs(10)).unwrap();
//! let limiter = FixedWindowLimiter::new(Arc::new(MemoryStore::new()), config);
//!
//! assert!(limiter.check("bob").await.is_ok());
//! assert!(limiter.check("bob").await.is_ok());
//! assert!(matches!(
//!     limiter.check("bob").await,
//!     Err(StorageError::RateLimitExceeded { .. })
//! ));
//! # });
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use crate::{
    backend::KeyValueStore,
    clock::{Clock, SystemClock},
    error::{StorageError, StorageResult},
};

/// Key prefix for rate-limit counters.
pub const RATE_LIMIT_KEY_PREFIX: &str = "ratelimit";

/// Metric name for rejected requests.
pub const METRIC_HITS: &str = "rate_limit_hits";

/// Metric name for accepted requests.
pub const METRIC_ALLOWED: &str = "rate_limit_allowed";

/// Metric name for checks that could not reach the store.
pub const METRIC_STORE_ERRORS: &str = "rate_limit_store_errors";

/// Quota for a fixed window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum accepted requests per window.
    limit: u64,
    /// Window length.
    window: Duration,
}

impl RateLimitConfig {
    /// Creates a new rate limit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Internal`] if `limit` is zero or `window` is
    /// shorter than one second.
    pub fn new(limit: u64, window: Duration) -> StorageResult<Self> {
        if limit == 0 {
            return Err(StorageError::internal("rate limit must be at least 1"));
        }
        if window < Duration::from_secs(1) {
            return Err(StorageError::internal("rate limit window must be at least 1s"));
        }
        Ok(Self { limit, window })
    }

    /// Returns the per-window quota.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Returns the window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }
}

/// What the limiter does when the store cannot be reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Reject the request with [`StorageError::Unavailable`].
    #[default]
    FailClosed,
    /// Allow the request and log a warning.
    FailOpen,
}

/// The outcome of an accepted check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// The configured quota.
    pub limit: u64,
    /// Requests left in the current window after this one.
    pub remaining: u64,
    /// Time until the current window closes.
    pub reset_after: Duration,
}

/// Counters tracked by the limiter.
#[derive(Debug, Default)]
struct RateLimitMetrics {
    allowed: AtomicU64,
    rejected: AtomicU64,
    store_errors: AtomicU64,
}

/// Snapshot of rate limiter metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RateLimitMetricsSnapshot {
    /// Total requests that were allowed through.
    pub allowed: u64,
    /// Total requests that were rejected for exceeding the quota.
    pub rejected: u64,
    /// Total checks where the store failed.
    pub store_errors: u64,
}

impl RateLimitMetricsSnapshot {
    /// Returns the counters paired with their exposition names.
    #[must_use]
    pub fn as_named(&self) -> [(&'static str, u64); 3] {
        [
            (METRIC_HITS, self.rejected),
            (METRIC_ALLOWED, self.allowed),
            (METRIC_STORE_ERRORS, self.store_errors),
        ]
    }
}

/// Fixed-window rate limiter.
pub struct FixedWindowLimiter {
    store: Arc<dyn KeyValueStore>,
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    policy: FailurePolicy,
    metrics: RateLimitMetrics,
}

impl std::fmt::Debug for FixedWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixedWindowLimiter")
            .field("config", &self.config)
            .field("policy", &self.policy)
            .field("store", &self.store.kind())
            .finish_non_exhaustive()
    }
}

/// Bucket index and time left in that bucket for a millisecond timestamp.
fn bucket_at(now_ms: i64, window: Duration) -> (i64, Duration) {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    let bucket = now_ms.div_euclid(window_ms);
    let elapsed = now_ms.rem_euclid(window_ms);
    let remaining_ms = u64::try_from(window_ms - elapsed).unwrap_or(0);
    (bucket, Duration::from_millis(remaining_ms))
}

impl FixedWindowLimiter {
    /// Creates a limiter using the system clock and [`FailurePolicy::FailClosed`].
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, config: RateLimitConfig) -> Self {
        Self {
            store,
            config,
            clock: Arc::new(SystemClock),
            policy: FailurePolicy::default(),
            metrics: RateLimitMetrics::default(),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the behaviour on store failure.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the configured quota.
    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Returns the store counter key for `identity` at the current time.
    #[must_use]
    pub fn current_key(&self, identity: &str) -> String {
        let (bucket, _) = bucket_at(self.clock.now().timestamp_millis(), self.config.window);
        format!("{RATE_LIMIT_KEY_PREFIX}:{identity}:{bucket}")
    }

    /// Counts one request from `identity`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::RateLimitExceeded`] when the quota is exhausted; the
    ///   retry hint is the time until the next window
    /// - [`StorageError::Unavailable`] when the store fails and the policy is
    ///   [`FailurePolicy::FailClosed`]
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn check(&self, identity: &str) -> StorageResult<RateDecision> {
        let (bucket, reset_after) =
            bucket_at(self.clock.now().timestamp_millis(), self.config.window);
        let key = format!("{RATE_LIMIT_KEY_PREFIX}:{identity}:{bucket}");

        let count = match self.store.incr(&key, Some(self.config.window)).await {
            Ok(count) => count,
            Err(e) => return self.on_store_error(identity, reset_after, e),
        };

        let count = u64::try_from(count).unwrap_or(0);
        if count > self.config.limit {
            self.metrics.rejected.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                identity,
                count,
                limit = self.config.limit,
                retry_after_ms = reset_after.as_millis() as u64,
                "rate limit exceeded"
            );
            return Err(StorageError::rate_limit_exceeded(reset_after));
        }

        self.metrics.allowed.fetch_add(1, Ordering::Relaxed);
        Ok(RateDecision {
            limit: self.config.limit,
            remaining: self.config.limit - count,
            reset_after,
        })
    }

    fn on_store_error(
        &self,
        identity: &str,
        reset_after: Duration,
        err: StorageError,
    ) -> StorageResult<RateDecision> {
        self.metrics.store_errors.fetch_add(1, Ordering::Relaxed);
        match self.policy {
            FailurePolicy::FailClosed => {
                tracing::error!(identity, error = %err, "rate limit store failure; rejecting request");
                Err(StorageError::unavailable("rate limit counter unavailable", err))
            },
            FailurePolicy::FailOpen => {
                tracing::warn!(identity, error = %err, "rate limit store failure; allowing request");
                self.metrics.allowed.fetch_add(1, Ordering::Relaxed);
                Ok(RateDecision {
                    limit: self.config.limit,
                    remaining: self.config.limit,
                    reset_after,
                })
            },
        }
    }

    /// Returns a snapshot of the rate limiter metrics.
    #[must_use]
    pub fn metrics_snapshot(&self) -> RateLimitMetricsSnapshot {
        RateLimitMetricsSnapshot {
            allowed: self.metrics.allowed.load(Ordering::Relaxed),
            rejected: self.metrics.rejected.load(Ordering::Relaxed),
            store_errors: self.metrics.store_errors.load(Ordering::Relaxed),
        }
    }
}
