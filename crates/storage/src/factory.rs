//! Store selection.
//!
//! [`connect_store`] makes exactly one bounded connectivity probe against the
//! configured networked store. On success it returns the [`RedisStore`]; on
//! any failure it returns a fresh [`MemoryStore`] and emits a single warning
//! announcing per-process degraded mode. The decision is made once, here;
//! later operation failures surface as [`StorageError`](crate::StorageError)
//! values and never switch backends.

use std::sync::Arc;

use crate::{
    backend::KeyValueStore,
    config::{StoreConfig, redact_url},
    memory::MemoryStore,
    redis_store::RedisStore,
};

/// Connects to the configured store, falling back to an in-process store
/// when it cannot be reached.
///
/// Callers use the returned handle identically either way; inspect
/// [`KeyValueStore::kind`] only for diagnostics.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use bytes::Bytes;
/// use medai_guard_storage::{KeyValueStore, StoreConfig, StoreKind, connect_store};
///
/// # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
/// let config = StoreConfig::builder()
///     .url("redis://127.0.0.1:1/")
///     .connect_timeout(Duration::from_millis(200))
///     .build()
///     .unwrap();
///
/// let store = connect_store(&config).await;
/// assert_eq!(store.kind(), StoreKind::Memory);
///
/// store.set("k", Bytes::from("v"), None).await.unwrap();
/// assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from("v")));
/// # });
/// ```
pub async fn connect_store(config: &StoreConfig) -> Arc<dyn KeyValueStore> {
    match RedisStore::connect(config).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::warn!(
                url = %redact_url(config.url()),
                error = %e,
                "key-value store unreachable; using in-process fallback. \
                 Rate limits and token revocations are enforced per instance only"
            );
            Arc::new(MemoryStore::new())
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use super::*;
    use crate::backend::StoreKind;

    fn unreachable_config() -> StoreConfig {
        StoreConfig::builder()
            .url("redis://127.0.0.1:1/")
            .connect_timeout(Duration::from_millis(300))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn falls_back_to_memory_when_unreachable() {
        let store = connect_store(&unreachable_config()).await;
        assert_eq!(store.kind(), StoreKind::Memory);
        assert!(store.ping().await);
    }

    #[tokio::test]
    async fn fallback_is_transparent_to_callers() {
        let store = connect_store(&unreachable_config()).await;
        store.set("k", Bytes::from("v"), None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from("v")));
        assert_eq!(store.incr("n", Some(Duration::from_secs(5))).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn each_factory_call_gets_its_own_fallback() {
        let a = connect_store(&unreachable_config()).await;
        let b = connect_store(&unreachable_config()).await;
        a.set("k", Bytes::from("v"), None).await.unwrap();
        assert_eq!(b.get("k").await.unwrap(), None);
    }
}
