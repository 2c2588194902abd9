//! In-process key-value store.
//!
//! This module provides [`MemoryStore`], the fallback the store factory
//! substitutes when the networked store cannot be reached. It satisfies the
//! full [`KeyValueStore`] contract, including TTLs and atomic increments, but
//! its data lives in one process only.
//!
//! # Features
//!
//! - **Thread-safe**: Uses [`parking_lot::RwLock`] for concurrent access
//! - **Atomic increments**: `incr` runs entirely under the write lock
//! - **TTL support**: Lazy expiry on access plus a background sweep task
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use medai_guard_storage::{KeyValueStore, MemoryStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     store.set("greeting", Bytes::from("hello"), None).await.unwrap();
//!     let value = store.get("greeting").await.unwrap();
//!
//!     assert_eq!(value.unwrap().as_ref(), b"hello");
//! }
//! ```
//!
//! # Limitations
//!
//! - Data is not persisted; all data is lost when the process exits
//! - Not shared between processes, so rate limits and revocations become
//!   per-instance while this store is active
//! - The sweep runs every second; reads never observe expired keys regardless

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::{select, sync::watch, time::sleep};

use crate::{
    backend::{KeyValueStore, StoreKind},
    error::{StorageError, StorageResult},
};

/// Interval between background sweeps of expired keys.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Holds the shutdown signal sender. When dropped, the watch channel
/// closes and the sweep task exits.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        // Best-effort signal; the receiver may already be gone.
        let _ = self.shutdown_tx.send(());
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory key-value store.
///
/// # Cloning
///
/// `MemoryStore` is cheaply cloneable via [`Arc`]. All clones share the
/// same underlying map.
///
/// # Shutdown
///
/// The background sweep task stops automatically when all clones are
/// dropped. When constructed outside a tokio runtime no task is spawned and
/// expiry is purely lazy.
#[derive(Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<String, Entry>>>,
    shutdown_guard: Arc<ShutdownGuard>,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").field("keys", &self.data.read().len()).finish()
    }
}

impl MemoryStore {
    /// Creates an empty store and, if a tokio runtime is available, starts
    /// the background sweep.
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let store = Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
        };

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            // The task holds only a weak reference so it never keeps the map
            // alive on its own.
            let data = Arc::downgrade(&store.data);
            handle.spawn(async move {
                sweep_expired_keys(data, shutdown_rx).await;
            });
        }

        store
    }

    /// Signals the background sweep task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    /// Number of live (unexpired) keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.data.read().values().filter(|e| !e.is_expired(now)).count()
    }

    /// Whether the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining lifetime of a key, `None` when absent or persistent.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let data = self.data.read();
        let entry = data.get(key).filter(|e| !e.is_expired(now))?;
        entry.expires_at.map(|at| at.saturating_duration_since(now))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

async fn sweep_expired_keys(
    data: std::sync::Weak<RwLock<HashMap<String, Entry>>>,
    mut shutdown_rx: watch::Receiver<()>,
) {
    loop {
        select! {
            _ = sleep(SWEEP_INTERVAL) => {}
            _ = shutdown_rx.changed() => {
                return;
            }
        }

        let Some(data) = data.upgrade() else {
            return;
        };
        let removed = remove_expired_from(&data);
        if removed > 0 {
            tracing::trace!(removed, "swept expired keys");
        }
    }
}

fn remove_expired_from(data: &RwLock<HashMap<String, Entry>>) -> usize {
    let now = Instant::now();
    let mut guard = data.write();
    let before = guard.len();
    guard.retain(|_, entry| !entry.is_expired(now));
    before - guard.len()
}

fn expiry_from(ttl: Duration) -> Option<Instant> {
    Instant::now().checked_add(ttl)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let now = Instant::now();
        let data = self.data.read();
        Ok(data.get(key).filter(|e| !e.is_expired(now)).map(|e| e.value.clone()))
    }

    #[tracing::instrument(level = "trace", skip(self, value))]
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> StorageResult<()> {
        let mut data = self.data.write();
        match ttl {
            Some(ttl) if ttl.is_zero() => {
                data.remove(key);
            },
            Some(ttl) => {
                data.insert(key.to_owned(), Entry { value, expires_at: expiry_from(ttl) });
            },
            None => {
                data.insert(key.to_owned(), Entry { value, expires_at: None });
            },
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn incr(&self, key: &str, ttl_if_new: Option<Duration>) -> StorageResult<i64> {
        let now = Instant::now();
        let mut data = self.data.write();

        let live = data.get(key).filter(|e| !e.is_expired(now)).cloned();
        let next = match live {
            Some(entry) => {
                let current = std::str::from_utf8(&entry.value)
                    .ok()
                    .and_then(|s| s.parse::<i64>().ok())
                    .ok_or_else(|| {
                        StorageError::serialization(format!("value at '{key}' is not an integer"))
                    })?;
                let next = current
                    .checked_add(1)
                    .ok_or_else(|| StorageError::serialization("increment would overflow"))?;
                data.insert(
                    key.to_owned(),
                    Entry { value: Bytes::from(next.to_string()), expires_at: entry.expires_at },
                );
                next
            },
            None => {
                let expires_at = ttl_if_new.filter(|t| !t.is_zero()).and_then(expiry_from);
                data.insert(key.to_owned(), Entry { value: Bytes::from_static(b"1"), expires_at });
                1
            },
        };

        Ok(next)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        let now = Instant::now();
        let mut data = self.data.write();

        match data.get(key).map(|e| e.is_expired(now)) {
            Some(false) if ttl.is_zero() => {
                data.remove(key);
                Ok(true)
            },
            Some(false) => {
                if let Some(entry) = data.get_mut(key) {
                    entry.expires_at = expiry_from(ttl);
                }
                Ok(true)
            },
            Some(true) => {
                data.remove(key);
                Ok(false)
            },
            None => Ok(false),
        }
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.data.write().remove(key);
        Ok(())
    }

    async fn ping(&self) -> bool {
        // A poisoned or deadlocked map would block here.
        let _unused = self.data.read();
        true
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Memory
    }
}
