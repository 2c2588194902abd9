//! Audit trail error types.

use std::{io, sync::Arc};

use medai_guard_storage::BoxError;
use thiserror::Error;
use uuid::Uuid;

/// Errors produced by the audit trail and its sinks.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`; new variants may be added in
/// future minor releases without a semver-breaking change.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum AuditError {
    /// Recomputing the hash chain disagreed with a stored entry.
    #[error("Audit chain corrupted at entry {entry_id} (position {position})")]
    ChainCorrupted {
        /// Identifier of the first entry that failed verification.
        entry_id: Uuid,
        /// Zero-based index of that entry in chain order.
        position: usize,
    },

    /// A record was rejected before it joined the chain.
    #[error("Invalid audit record: {0}")]
    InvalidRecord(String),

    /// The persistence sink failed.
    #[error("Audit sink error: {message}")]
    Sink {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },

    /// An entry could not be encoded or decoded.
    #[error("Audit serialization error: {message}")]
    Serialization {
        /// Description of the failure.
        message: String,
        /// The underlying error.
        #[source]
        source: Option<BoxError>,
    },
}

impl AuditError {
    /// Creates an [`AuditError::InvalidRecord`] error.
    #[must_use]
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord(message.into())
    }

    /// Creates an [`AuditError::Sink`] error with a source.
    #[must_use]
    pub fn sink(message: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Sink { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Creates an [`AuditError::Serialization`] error with a source.
    #[must_use]
    pub fn serialization(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization { message: message.into(), source: Some(Arc::new(source)) }
    }

    /// Returns the offending entry for [`AuditError::ChainCorrupted`].
    #[must_use]
    pub fn corrupted_entry(&self) -> Option<Uuid> {
        match self {
            Self::ChainCorrupted { entry_id, .. } => Some(*entry_id),
            _ => None,
        }
    }
}

impl From<io::Error> for AuditError {
    fn from(err: io::Error) -> Self {
        Self::sink(err.to_string(), err)
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string(), err)
    }
}

/// Result type alias for audit operations.
pub type AuditResult<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::error::Error;

    use super::*;

    #[test]
    fn chain_corrupted_names_entry() {
        let id = Uuid::nil();
        let err = AuditError::ChainCorrupted { entry_id: id, position: 3 };
        assert_eq!(
            err.to_string(),
            "Audit chain corrupted at entry 00000000-0000-0000-0000-000000000000 (position 3)"
        );
        assert_eq!(err.corrupted_entry(), Some(id));
        assert_eq!(AuditError::invalid_record("x").corrupted_entry(), None);
    }

    #[test]
    fn io_error_preserves_source() {
        let err: AuditError = io::Error::new(io::ErrorKind::PermissionDenied, "denied").into();
        assert!(matches!(err, AuditError::Sink { .. }));
        assert_eq!(err.source().unwrap().to_string(), "denied");
    }
}
