//! Store operation metrics.
//!
//! [`MeteredStore`] wraps any [`KeyValueStore`] and records per-operation
//! counts, error counts and cumulative latency into a shared [`StoreMetrics`].
//!
//! # Memory Ordering
//!
//! All counters use `Ordering::Relaxed`. Each counter is independent and
//! monotonically increasing; `snapshot()` may observe counters that are
//! slightly inconsistent relative to each other, which is acceptable for
//! telemetry.
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use medai_guard_storage::{KeyValueStore, MemoryStore, metrics::MeteredStore};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let store = MeteredStore::new(Arc::new(MemoryStore::new()));
//! store.set("k", Bytes::from("v"), None).await.unwrap();
//! store.get("k").await.unwrap();
//!
//! let snapshot = store.metrics().snapshot();
//! assert_eq!(snapshot.set_count, 1);
//! assert_eq!(snapshot.get_count, 1);
//! # });
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    backend::{KeyValueStore, StoreKind},
    error::StorageResult,
};

/// Operation kinds tracked by [`StoreMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Get,
    Set,
    Incr,
    Expire,
    Delete,
}

#[derive(Debug, Default)]
struct OpCounters {
    count: AtomicU64,
    latency_us: AtomicU64,
}

impl OpCounters {
    fn record(&self, elapsed: Duration) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.latency_us.fetch_add(micros, Ordering::Relaxed);
    }
}

/// Lock-free operation counters shared by clones.
#[derive(Debug, Clone, Default)]
pub struct StoreMetrics {
    inner: Arc<StoreMetricsInner>,
}

#[derive(Debug, Default)]
struct StoreMetricsInner {
    get: OpCounters,
    set: OpCounters,
    incr: OpCounters,
    expire: OpCounters,
    delete: OpCounters,
    errors: AtomicU64,
    timeouts: AtomicU64,
}

/// Point-in-time copy of [`StoreMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreMetricsSnapshot {
    /// Number of `get` calls.
    pub get_count: u64,
    /// Number of `set` calls.
    pub set_count: u64,
    /// Number of `incr` calls.
    pub incr_count: u64,
    /// Number of `expire` calls.
    pub expire_count: u64,
    /// Number of `delete` calls.
    pub delete_count: u64,
    /// Cumulative `get` latency in microseconds.
    pub get_latency_us: u64,
    /// Cumulative `set` latency in microseconds.
    pub set_latency_us: u64,
    /// Cumulative `incr` latency in microseconds.
    pub incr_latency_us: u64,
    /// Calls that returned an error.
    pub error_count: u64,
    /// Calls that returned a timeout.
    pub timeout_count: u64,
}

impl StoreMetricsSnapshot {
    /// Total number of operations of any kind.
    #[must_use]
    pub fn total_ops(&self) -> u64 {
        self.get_count + self.set_count + self.incr_count + self.expire_count + self.delete_count
    }

    /// Average `incr` latency in microseconds.
    #[must_use]
    pub fn avg_incr_latency_us(&self) -> f64 {
        if self.incr_count == 0 {
            0.0
        } else {
            self.incr_latency_us as f64 / self.incr_count as f64
        }
    }
}

impl StoreMetrics {
    /// Creates a zeroed set of counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, op: Op) -> &OpCounters {
        match op {
            Op::Get => &self.inner.get,
            Op::Set => &self.inner.set,
            Op::Incr => &self.inner.incr,
            Op::Expire => &self.inner.expire,
            Op::Delete => &self.inner.delete,
        }
    }

    fn observe<T>(&self, op: Op, elapsed: Duration, result: &StorageResult<T>) {
        self.counters(op).record(elapsed);
        if let Err(e) = result {
            self.inner.errors.fetch_add(1, Ordering::Relaxed);
            if matches!(e, crate::StorageError::Timeout) {
                self.inner.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            tracing::debug!(op = ?op, error = %e, "store operation failed");
        }
    }

    /// Returns the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StoreMetricsSnapshot {
        let i = &self.inner;
        StoreMetricsSnapshot {
            get_count: i.get.count.load(Ordering::Relaxed),
            set_count: i.set.count.load(Ordering::Relaxed),
            incr_count: i.incr.count.load(Ordering::Relaxed),
            expire_count: i.expire.count.load(Ordering::Relaxed),
            delete_count: i.delete.count.load(Ordering::Relaxed),
            get_latency_us: i.get.latency_us.load(Ordering::Relaxed),
            set_latency_us: i.set.latency_us.load(Ordering::Relaxed),
            incr_latency_us: i.incr.latency_us.load(Ordering::Relaxed),
            error_count: i.errors.load(Ordering::Relaxed),
            timeout_count: i.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// A [`KeyValueStore`] wrapper that records metrics for every call.
#[derive(Clone)]
pub struct MeteredStore {
    inner: Arc<dyn KeyValueStore>,
    metrics: StoreMetrics,
}

impl std::fmt::Debug for MeteredStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeteredStore")
            .field("kind", &self.inner.kind())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

impl MeteredStore {
    /// Wraps a store with fresh counters.
    #[must_use]
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner, metrics: StoreMetrics::new() }
    }

    /// Returns the shared counters.
    #[must_use]
    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }
}

#[async_trait]
impl KeyValueStore for MeteredStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let start = Instant::now();
        let result = self.inner.get(key).await;
        self.metrics.observe(Op::Get, start.elapsed(), &result);
        result
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> StorageResult<()> {
        let start = Instant::now();
        let result = self.inner.set(key, value, ttl).await;
        self.metrics.observe(Op::Set, start.elapsed(), &result);
        result
    }

    async fn incr(&self, key: &str, ttl_if_new: Option<Duration>) -> StorageResult<i64> {
        let start = Instant::now();
        let result = self.inner.incr(key, ttl_if_new).await;
        self.metrics.observe(Op::Incr, start.elapsed(), &result);
        result
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        let start = Instant::now();
        let result = self.inner.expire(key, ttl).await;
        self.metrics.observe(Op::Expire, start.elapsed(), &result);
        result
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let start = Instant::now();
        let result = self.inner.delete(key).await;
        self.metrics.observe(Op::Delete, start.elapsed(), &result);
        result
    }

    async fn ping(&self) -> bool {
        self.inner.ping().await
    }

    fn kind(&self) -> StoreKind {
        self.inner.kind()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::{memory::MemoryStore, testutil::FailingStore};

    #[tokio::test]
    async fn counts_each_operation() {
        let store = MeteredStore::new(Arc::new(MemoryStore::new()));
        store.set("k", Bytes::from("1"), None).await.unwrap();
        store.get("k").await.unwrap();
        store.incr("k", None).await.unwrap();
        store.expire("k", Duration::from_secs(1)).await.unwrap();
        store.delete("k").await.unwrap();

        let snap = store.metrics().snapshot();
        assert_eq!(snap.get_count, 1);
        assert_eq!(snap.set_count, 1);
        assert_eq!(snap.incr_count, 1);
        assert_eq!(snap.expire_count, 1);
        assert_eq!(snap.delete_count, 1);
        assert_eq!(snap.total_ops(), 5);
        assert_eq!(snap.error_count, 0);
    }

    #[tokio::test]
    async fn counts_errors_and_timeouts() {
        let store = MeteredStore::new(Arc::new(FailingStore::new(crate::StorageError::Timeout)));
        let _ = store.get("k").await;
        let _ = store.incr("k", None).await;

        let snap = store.metrics().snapshot();
        assert_eq!(snap.error_count, 2);
        assert_eq!(snap.timeout_count, 2);
        assert_eq!(snap.total_ops(), 2);
    }

    #[tokio::test]
    async fn clones_share_counters() {
        let store = MeteredStore::new(Arc::new(MemoryStore::new()));
        let clone = store.clone();
        clone.get("k").await.unwrap();
        assert_eq!(store.metrics().snapshot().get_count, 1);
        assert_eq!(store.kind(), StoreKind::Memory);
    }

    #[test]
    fn average_latency_handles_zero() {
        assert_eq!(StoreMetricsSnapshot::default().avg_incr_latency_us(), 0.0);
    }
}
