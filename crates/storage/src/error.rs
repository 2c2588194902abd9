//! Storage error types and result alias.
//!
//! Every [`KeyValueStore`](crate::KeyValueStore) implementation maps its
//! internal failures onto [`StorageError`], so callers never branch on which
//! backend produced an error.
//!
//! # Error Types
//!
//! - [`StorageError::Connection`] - The store could not be reached
//! - [`StorageError::Timeout`] - An operation exceeded its bounded timeout
//! - [`StorageError::Serialization`] - A stored value had an unexpected shape
//! - [`StorageError::Internal`] - Backend-specific failures and invalid arguments
//! - [`StorageError::Unavailable`] - A fail-closed policy refused to proceed
//! - [`StorageError::RateLimitExceeded`] - The caller exhausted its quota
//!
//! # Example
//!
//! ```
//! use medai_guard_storage::{StorageError, StorageResult};
//!
//! fn lookup(_key: &str) -> StorageResult<Vec<u8>> {
//!     Err(StorageError::connection("connection refused"))
//! }
//!
//! assert!(lookup("k").unwrap_err().is_transient());
//! ```

use std::{sync::Arc, time::Duration};

use thiserror::Error;

/// A boxed error type for source chain tracking.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during key-value store operations.
///
/// Errors preserve their source chain via the `#[source]` attribute, enabling
/// debugging tools to display the full error context.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions must
/// include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    /// Connection or network error.
    ///
    /// Connection refused, DNS failure, a dropped socket or a protocol error
    /// reported by the remote store.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
        /// The underlying error that caused this connection failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Serialization or deserialization error.
    ///
    /// Raised when a stored value cannot be interpreted, e.g. `incr` on a key
    /// holding a non-integer value.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization error.
        message: String,
        /// The underlying error that caused serialization to fail.
        #[source]
        source: Option<BoxError>,
    },

    /// Internal storage backend error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
        /// The underlying error that caused this internal failure.
        #[source]
        source: Option<BoxError>,
    },

    /// Operation timed out.
    ///
    /// Store calls carry a bounded timeout and are never retried inside this
    /// crate; a retried `incr` could double-count.
    #[error("Operation timeout")]
    Timeout,

    /// The request quota for the current window is exhausted.
    #[error("Rate limit exceeded, retry after {}ms", .retry_after.as_millis())]
    RateLimitExceeded {
        /// Time until the next window opens.
        retry_after: Duration,
    },

    /// The store is unavailable and the caller's policy refuses to degrade.
    #[error("Store unavailable: {message}")]
    Unavailable {
        /// Description of why the store is considered unavailable.
        message: String,
        /// The store error that triggered the refusal.
        #[source]
        source: Option<BoxError>,
    },
}

impl StorageError {
    /// Creates a new `Connection` error with the given message.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection { message: message.into(), source: None }
    }

    /// Creates a new `Connection` error with a message and source error.
    #[must_use]
    pub fn connection_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Serialization` error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization { message: message.into(), source: None }
    }

    /// Creates a new `Serialization` error with a message and source error.
    #[must_use]
    pub fn serialization_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Internal` error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Creates a new `Internal` error with a message and source error.
    #[must_use]
    pub fn internal_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Internal { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates a new `Timeout` error.
    #[must_use]
    pub fn timeout() -> Self {
        Self::Timeout
    }

    /// Creates a new `RateLimitExceeded` error.
    #[must_use]
    pub fn rate_limit_exceeded(retry_after: Duration) -> Self {
        Self::RateLimitExceeded { retry_after }
    }

    /// Returns the retry hint carried by `RateLimitExceeded`.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// Wraps a store error into `Unavailable`, keeping it as the source.
    #[must_use]
    pub fn unavailable(message: impl Into<String>, source: StorageError) -> Self {
        Self::Unavailable { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns `true` when retrying later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::Timeout
                | Self::Unavailable { .. }
                | Self::RateLimitExceeded { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(StorageError::timeout().to_string(), "Operation timeout");
        assert_eq!(
            StorageError::connection("refused").to_string(),
            "Connection error: refused"
        );
        assert_eq!(
            StorageError::serialization("not an integer").to_string(),
            "Serialization error: not an integer"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(StorageError::timeout().is_transient());
        assert!(StorageError::connection("x").is_transient());
        assert!(StorageError::unavailable("x", StorageError::Timeout).is_transient());
        assert!(StorageError::rate_limit_exceeded(Duration::from_secs(1)).is_transient());
        assert!(!StorageError::serialization("x").is_transient());
        assert!(!StorageError::internal("x").is_transient());
    }

    #[test]
    fn test_rate_limit_display_and_retry_after() {
        let err = StorageError::rate_limit_exceeded(Duration::from_millis(150));
        assert_eq!(err.to_string(), "Rate limit exceeded, retry after 150ms");
        assert_eq!(err.retry_after(), Some(Duration::from_millis(150)));
        assert_eq!(StorageError::timeout().retry_after(), None);
    }

    #[test]
    fn test_unavailable_preserves_source_chain() {
        let err = StorageError::unavailable("rate limiter", StorageError::connection("refused"));
        let source = err.source().expect("source exists");
        assert_eq!(source.to_string(), "Connection error: refused");
    }

    #[test]
    fn test_with_source_preserves_chain() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = StorageError::connection_with_source("connect failed", io);
        assert_eq!(err.source().expect("source").to_string(), "refused");
    }
}
