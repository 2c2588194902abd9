//! Shared test utilities for code built on [`KeyValueStore`].
//!
//! Feature-gated behind `testutil` to keep it out of production builds.
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! medai-guard-storage = { path = "../storage", features = ["testutil"] }
//! ```
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use medai_guard_storage::testutil::{FailingStore, fixed_clock};
//! ```

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    backend::{KeyValueStore, StoreKind},
    clock::ManualClock,
    error::{StorageError, StorageResult},
};

/// Unix timestamp used by [`fixed_clock`]: 2023-11-14T22:13:20Z.
pub const FIXED_EPOCH_SECS: i64 = 1_700_000_000;

/// A [`ManualClock`] frozen at [`FIXED_EPOCH_SECS`].
#[must_use]
pub fn fixed_clock() -> ManualClock {
    ManualClock::at_unix(FIXED_EPOCH_SECS)
}

/// A store whose every operation fails with a clone of the configured error.
///
/// Counts calls so tests can assert that a code path never reached the store.
#[derive(Debug, Clone)]
pub struct FailingStore {
    error: StorageError,
    calls: Arc<AtomicUsize>,
}

impl FailingStore {
    /// Creates a store failing with `error`.
    #[must_use]
    pub fn new(error: StorageError) -> Self {
        Self { error, calls: Arc::new(AtomicUsize::new(0)) }
    }

    /// Number of operations attempted so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail<T>(&self) -> StorageResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

impl Default for FailingStore {
    fn default() -> Self {
        Self::new(StorageError::connection("connection refused"))
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> StorageResult<Option<Bytes>> {
        self.fail()
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Option<Duration>) -> StorageResult<()> {
        self.fail()
    }

    async fn incr(&self, _key: &str, _ttl_if_new: Option<Duration>) -> StorageResult<i64> {
        self.fail()
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> StorageResult<bool> {
        self.fail()
    }

    async fn delete(&self, _key: &str) -> StorageResult<()> {
        self.fail()
    }

    async fn ping(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        false
    }

    fn kind(&self) -> StoreKind {
        StoreKind::Redis
    }
}

/// Assert that a [`StorageResult`] is an error of the given
/// [`StorageError`] variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use medai_guard_storage::assert_storage_error;
/// use medai_guard_storage::error::{StorageError, StorageResult};
///
/// let result: StorageResult<()> = Err(StorageError::Timeout);
/// assert_storage_error!(result, Timeout);
/// ```
#[macro_export]
macro_rules! assert_storage_error {
    ($result:expr, $variant:ident) => {
        match $result {
            Err($crate::error::StorageError::$variant { .. }) => {},
            other => panic!(
                "expected StorageError::{}, got: {:?}",
                stringify!($variant),
                other
            ),
        }
    };
}

/// Assert that a [`StorageResult`] is `Ok`, returning the inner value.
#[macro_export]
macro_rules! assert_storage_ok {
    ($result:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("expected Ok, got StorageError: {e:?}"),
        }
    };
    ($result:expr, $msg:expr) => {
        match $result {
            Ok(val) => val,
            Err(e) => panic!("{}: expected Ok, got StorageError: {e:?}", $msg),
        }
    };
}
