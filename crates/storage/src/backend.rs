//! Key-value store trait definition.
//!
//! This module defines the [`KeyValueStore`] trait, the only interface the
//! token revocation service, the rate limiter and the gateway depend on. Two
//! implementations exist: [`RedisStore`](crate::RedisStore) for a shared,
//! networked store and [`MemoryStore`](crate::MemoryStore) as the in-process
//! fallback. [`connect_store`](crate::connect_store) picks one.
//!
//! # Design Philosophy
//!
//! - **Minimal**: get, set, incr, expire, delete, ping. Nothing that needs
//!   cross-key transactions.
//! - **Atomic increments**: `incr` creates, increments and (for new keys)
//!   sets the expiry in a single store-side step.
//! - **Bounded**: networked implementations time out every call and report
//!   [`StorageError::Timeout`](crate::StorageError::Timeout) rather than
//!   hanging a request handler.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StorageResult;

/// Which concrete store is serving requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    /// A networked Redis-compatible store shared across processes.
    Redis,
    /// The in-process fallback map. Not shared between processes.
    Memory,
}

impl StoreKind {
    /// Returns `true` when enforcement backed by this store is per-process.
    #[must_use]
    pub fn is_process_local(self) -> bool {
        matches!(self, Self::Memory)
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Redis => write!(f, "redis"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Abstract key-value store.
///
/// Implementations are thread-safe (`Send + Sync`) and shared across all
/// request workers of a process, usually as `Arc<dyn KeyValueStore>`.
///
/// # Key Operations
///
/// | Method | Description |
/// |--------|-------------|
/// | [`get`](KeyValueStore::get) | Retrieve a value by key |
/// | [`set`](KeyValueStore::set) | Store a value, optionally expiring |
/// | [`incr`](KeyValueStore::incr) | Atomic increment, creating at 1 |
/// | [`expire`](KeyValueStore::expire) | Replace the expiry of an existing key |
/// | [`delete`](KeyValueStore::delete) | Remove a key |
/// | [`ping`](KeyValueStore::ping) | Connectivity probe |
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bytes::Bytes;
/// use medai_guard_storage::{KeyValueStore, MemoryStore};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let store = MemoryStore::new();
///
/// store.set("k", Bytes::from_static(b"v"), None).await.unwrap();
/// assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));
///
/// assert_eq!(store.incr("hits", Some(Duration::from_secs(10))).await.unwrap(), 1);
/// assert_eq!(store.incr("hits", Some(Duration::from_secs(10))).await.unwrap(), 2);
/// # });
/// ```
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` when the key is absent or has expired.
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Stores a value.
    ///
    /// With `ttl = None` the key never expires and any previous expiry is
    /// cleared. A zero TTL removes the key.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> StorageResult<()>;

    /// Atomically increments the integer stored at `key` and returns the new
    /// value.
    ///
    /// An absent key is created with value 1; only in that case is
    /// `ttl_if_new` applied. Existing expiries are never extended.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialization`](crate::StorageError::Serialization)
    /// if the key holds something other than a decimal integer.
    async fn incr(&self, key: &str, ttl_if_new: Option<Duration>) -> StorageResult<i64>;

    /// Sets the expiry of an existing key.
    ///
    /// Returns `false` when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool>;

    /// Removes a key. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Probes connectivity. Never returns an error; an unreachable store
    /// reports `false`.
    async fn ping(&self) -> bool;

    /// Reports which implementation is active.
    fn kind(&self) -> StoreKind;
}

#[async_trait]
impl<S: KeyValueStore + ?Sized> KeyValueStore for Arc<S> {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> StorageResult<()> {
        (**self).set(key, value, ttl).await
    }

    async fn incr(&self, key: &str, ttl_if_new: Option<Duration>) -> StorageResult<i64> {
        (**self).incr(key, ttl_if_new).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        (**self).expire(key, ttl).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        (**self).delete(key).await
    }

    async fn ping(&self) -> bool {
        (**self).ping().await
    }

    fn kind(&self) -> StoreKind {
        (**self).kind()
    }
}
