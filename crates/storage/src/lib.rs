//! Shared key-value store abstraction for the MedAI security gateway.
//!
//! This crate provides the [`KeyValueStore`] trait that token revocation and
//! rate limiting are built on, its two implementations, and the factory that
//! picks between them.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SecurityGateway                         │
//! │        authenticate │ check_rate_limit │ record_audit       │
//! ├─────────────────────────────────────────────────────────────┤
//! │   RevocationService          │   FixedWindowLimiter         │
//! │   revoked:{jti}              │   ratelimit:{id}:{bucket}    │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  KeyValueStore trait                        │
//! │       (get, set, incr, expire, delete, ping)                │
//! ├──────────────┬──────────────────────────────────────────────┤
//! │ RedisStore   │            MemoryStore                       │
//! │ (shared)     │  (in-process fallback)                       │
//! └──────────────┴──────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```
//! use std::time::Duration;
//! use bytes::Bytes;
//! use medai_guard_storage::{KeyValueStore, StoreConfig, connect_store};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = StoreConfig::builder()
//!         .url("redis://127.0.0.1:1/")
//!         .connect_timeout(Duration::from_millis(200))
//!         .build()?;
//!
//!     // Falls back to the in-process store when Redis is unreachable.
//!     let store = connect_store(&config).await;
//!
//!     store.set("session:42", Bytes::from("alice"), Some(Duration::from_secs(60))).await?;
//!     assert_eq!(store.get("session:42").await?, Some(Bytes::from("alice")));
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - **`testutil`**: Enables the `testutil` module with a failing store, a
//!   fixed clock and assertion macros. Enable this in `[dev-dependencies]`.

#![deny(unsafe_code)]

pub mod backend;
pub mod clock;
pub mod config;
pub mod error;
pub mod factory;
pub mod memory;
pub mod metrics;
pub mod rate_limiter;
pub mod redis_store;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used)]
pub mod testutil;

// Re-export primary types at crate root for convenience
pub use backend::{KeyValueStore, StoreKind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{StoreConfig, redact_url};
pub use error::{BoxError, StorageError, StorageResult};
pub use factory::connect_store;
pub use memory::MemoryStore;
pub use metrics::{MeteredStore, StoreMetrics, StoreMetricsSnapshot};
pub use rate_limiter::{
    FailurePolicy, FixedWindowLimiter, RateDecision, RateLimitConfig, RateLimitMetricsSnapshot,
};
pub use redis_store::RedisStore;
