//! Networked key-value store backed by a Redis-compatible server.
//!
//! [`RedisStore`] holds one multiplexed connection shared by every request
//! worker in the process. Each call is wrapped in the configured operation
//! timeout and never retried; on timeout the caller sees
//! [`StorageError::Timeout`].
//!
//! `incr` with a TTL runs as a single Lua script so that creating the
//! counter and setting its expiry cannot be split by a crash or a concurrent
//! client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::{AsyncCommands, Client, RedisError, Script, aio::MultiplexedConnection};

use crate::{
    backend::{KeyValueStore, StoreKind},
    config::{StoreConfig, redact_url},
    error::{StorageError, StorageResult},
};

/// Increments `KEYS[1]`; when the key was just created and `ARGV[1]` is a
/// non-zero millisecond count, applies it as the expiry.
const INCR_WITH_TTL: &str = r"
local n = redis.call('INCR', KEYS[1])
if n == 1 and tonumber(ARGV[1]) > 0 then
  redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return n
";

/// Redis-backed [`KeyValueStore`].
#[derive(Clone)]
pub struct RedisStore {
    connection: MultiplexedConnection,
    op_timeout: Duration,
    incr_script: Script,
    display_url: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("url", &self.display_url)
            .field("op_timeout", &self.op_timeout)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Opens a connection and probes it with `PING`, all within the
    /// configured connect timeout.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Connection`] if the URL is invalid, the server
    ///   refuses the connection or the probe fails
    /// - [`StorageError::Timeout`] if the connect timeout elapses
    #[tracing::instrument(skip(config), fields(url = %redact_url(config.url())))]
    pub async fn connect(config: &StoreConfig) -> StorageResult<Self> {
        let client = Client::open(config.url())
            .map_err(|e| StorageError::connection_with_source("invalid store URL", e))?;

        let connect = async {
            let mut connection = client.get_multiplexed_async_connection().await?;
            let pong: String = redis::cmd("PING").query_async(&mut connection).await?;
            Ok::<_, RedisError>((connection, pong))
        };

        let (connection, pong) = tokio::time::timeout(config.connect_timeout(), connect)
            .await
            .map_err(|_| StorageError::timeout())?
            .map_err(map_redis_error)?;

        if pong != "PONG" {
            return Err(StorageError::connection(format!("unexpected PING reply: {pong}")));
        }

        tracing::info!(url = %redact_url(config.url()), "connected to key-value store");

        Ok(Self {
            connection,
            op_timeout: config.operation_timeout(),
            incr_script: Script::new(INCR_WITH_TTL),
            display_url: redact_url(config.url()),
        })
    }

    /// Runs one store call under the operation timeout.
    async fn bounded<T, F>(&self, op: F) -> StorageResult<T>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(result) => result.map_err(map_redis_error),
            Err(_) => Err(StorageError::timeout()),
        }
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn map_redis_error(err: RedisError) -> StorageError {
    if err.is_timeout() {
        StorageError::timeout()
    } else if err.is_connection_refusal() || err.is_connection_dropped() || err.is_io_error() {
        StorageError::connection_with_source("store connection failed", err)
    } else if matches!(err.kind(), redis::ErrorKind::TypeError) {
        StorageError::serialization_with_source("unexpected value type", err)
    } else if err.to_string().contains("not an integer") {
        StorageError::serialization_with_source("value is not an integer", err)
    } else {
        StorageError::internal_with_source("store command failed", err)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    #[tracing::instrument(level = "trace", skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let mut conn = self.connection.clone();
        let value: Option<Vec<u8>> = self.bounded(conn.get(key)).await?;
        Ok(value.map(Bytes::from))
    }

    #[tracing::instrument(level = "trace", skip(self, value))]
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> StorageResult<()> {
        let mut conn = self.connection.clone();
        match ttl {
            Some(ttl) if ttl.is_zero() => {
                let _: i64 = self.bounded(conn.del(key)).await?;
            },
            Some(ttl) => {
                let mut cmd = redis::cmd("SET");
                cmd.arg(key).arg(value.as_ref()).arg("PX").arg(millis(ttl));
                let _: () = self.bounded(cmd.query_async(&mut conn)).await?;
            },
            None => {
                let _: () = self.bounded(conn.set(key, value.as_ref())).await?;
            },
        }
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn incr(&self, key: &str, ttl_if_new: Option<Duration>) -> StorageResult<i64> {
        let mut conn = self.connection.clone();
        let ttl_ms = ttl_if_new.filter(|t| !t.is_zero()).map_or(0, millis);
        let mut invocation = self.incr_script.key(key);
        invocation.arg(ttl_ms);
        let count: i64 = self.bounded(invocation.invoke_async(&mut conn)).await?;
        Ok(count)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn expire(&self, key: &str, ttl: Duration) -> StorageResult<bool> {
        let mut conn = self.connection.clone();
        if ttl.is_zero() {
            let removed: i64 = self.bounded(conn.del(key)).await?;
            return Ok(removed > 0);
        }
        let mut cmd = redis::cmd("PEXPIRE");
        cmd.arg(key).arg(millis(ttl));
        let applied: i64 = self.bounded(cmd.query_async(&mut conn)).await?;
        Ok(applied == 1)
    }

    #[tracing::instrument(level = "trace", skip(self))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut conn = self.connection.clone();
        let _: i64 = self.bounded(conn.del(key)).await?;
        Ok(())
    }

    async fn ping(&self) -> bool {
        let mut conn = self.connection.clone();
        let cmd = redis::cmd("PING");
        let reply: StorageResult<String> = self.bounded(cmd.query_async(&mut conn)).await;
        match reply {
            Ok(pong) => pong == "PONG",
            Err(e) => {
                tracing::debug!(error = %e, "store ping failed");
                false
            },
        }
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Redis
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn millis_rounds_up_sub_millisecond_ttls() {
        assert_eq!(millis(Duration::from_micros(10)), 1);
        assert_eq!(millis(Duration::from_secs(10)), 10_000);
    }

    #[tokio::test]
    async fn connect_to_unreachable_address_fails_fast() {
        let config = StoreConfig::builder()
            .url("redis://127.0.0.1:1/")
            .connect_timeout(Duration::from_millis(500))
            .build()
            .unwrap();

        let started = std::time::Instant::now();
        let err = RedisStore::connect(&config).await.unwrap_err();
        assert!(err.is_transient(), "unexpected error: {err:?}");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn connect_with_invalid_url_is_connection_error() {
        let config = StoreConfig::builder().url("not a url").build().unwrap();
        let err = RedisStore::connect(&config).await.unwrap_err();
        assert!(matches!(err, StorageError::Connection { .. }));
    }
}
