//! Caller-facing error taxonomy.
//!
//! Component errors from the authn, storage and audit crates are folded into
//! [`GatewayError`], which carries the HTTP status, a stable error code and a
//! public message that never reveals which token check failed.

use std::time::Duration;

use medai_guard_audit::AuditError;
use medai_guard_authn::{AuthError, Role};
use medai_guard_storage::{BoxError, StorageError};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Public message shared by every 401 response.
pub const UNAUTHORIZED_MESSAGE: &str = "Invalid or expired token";

/// Errors surfaced by [`SecurityGateway`](crate::SecurityGateway).
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`. Downstream match expressions must
/// include a wildcard arm (`_ =>`).
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The token's `exp` has passed.
    #[error("Token expired")]
    TokenExpired,

    /// The token could not be parsed, was signed with the wrong key or
    /// algorithm, or lacks a required claim.
    #[error("Malformed token: {reason}")]
    TokenMalformed {
        /// Internal description, for logs only.
        reason: String,
    },

    /// The token was explicitly revoked.
    #[error("Token revoked")]
    TokenRevoked,

    /// The caller's role does not satisfy the route's requirement.
    #[error("Insufficient role: requires {required}, got {actual}")]
    InsufficientRole {
        /// Role the operation needs.
        required: Role,
        /// Role carried by the token.
        actual: Role,
    },

    /// The caller exhausted its quota for the current window.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Time until the next window opens.
        retry_after: Duration,
    },

    /// The key-value store failed and the active policy refuses to degrade.
    #[error("Store unavailable: {message}")]
    StoreUnavailable {
        /// Description of the failure.
        message: String,
        /// The store error.
        #[source]
        source: Option<BoxError>,
    },

    /// Verification found a broken link in the audit chain.
    #[error("Audit chain corrupted at entry {entry_id}")]
    AuditChainCorrupted {
        /// First entry that failed verification.
        entry_id: Uuid,
    },

    /// An audit record could not be written.
    #[error("Audit failure: {0}")]
    Audit(#[source] AuditError),

    /// Startup configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON body returned to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Stable error code, e.g. `AUTH_002`.
    pub error_code: &'static str,
    /// Generic, non-revealing message.
    pub message: &'static str,
    /// Whole seconds to wait before retrying.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

impl GatewayError {
    /// Creates a [`GatewayError::ConfigurationError`].
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::ConfigurationError(message.into())
    }

    /// HTTP status equivalent.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::TokenExpired | Self::TokenMalformed { .. } | Self::TokenRevoked => 401,
            Self::InsufficientRole { .. } => 403,
            Self::RateLimited { .. } => 429,
            Self::StoreUnavailable { .. } => 503,
            Self::AuditChainCorrupted { .. }
            | Self::Audit(_)
            | Self::ConfigurationError(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Stable error code.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::TokenExpired => "AUTH_002",
            Self::TokenMalformed { .. } | Self::TokenRevoked => "AUTH_003",
            Self::InsufficientRole { .. } => "AUTH_004",
            Self::RateLimited { .. } => "RATE_001",
            Self::StoreUnavailable { .. } => "SYS_002",
            Self::AuditChainCorrupted { .. } => "AUDIT_001",
            Self::Audit(_) => "AUDIT_002",
            Self::ConfigurationError(_) => "CONF_001",
            Self::Internal(_) => "SYS_001",
        }
    }

    /// Message safe to return to the caller.
    #[must_use]
    pub fn public_message(&self) -> &'static str {
        match self.status_code() {
            401 => UNAUTHORIZED_MESSAGE,
            403 => "Insufficient permissions",
            429 => "Rate limit exceeded",
            503 => "Service unavailable",
            _ => "Internal server error",
        }
    }

    /// Retry hint for [`GatewayError::RateLimited`].
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }

    /// `Retry-After` header value in whole seconds, rounded up.
    #[must_use]
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after().map(ceil_secs)
    }

    /// Returns `true` for the 401 family.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status_code() == 401
    }

    /// Builds the client response body.
    #[must_use]
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error_code: self.error_code(),
            message: self.public_message(),
            retry_after: self.retry_after_secs(),
        }
    }
}

impl From<AuthError> for GatewayError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Expired => Self::TokenExpired,
            AuthError::Revoked => Self::TokenRevoked,
            AuthError::InsufficientRole { required, actual } => {
                Self::InsufficientRole { required, actual }
            },
            AuthError::RevocationUnavailable(source) => source.into(),
            AuthError::InvalidSigningKey(msg) => Self::ConfigurationError(msg),
            e if e.is_malformed() => Self::TokenMalformed { reason: e.to_string() },
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for GatewayError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::RateLimitExceeded { retry_after } => Self::RateLimited { retry_after },
            other => Self::StoreUnavailable {
                message: other.to_string(),
                source: Some(std::sync::Arc::new(other)),
            },
        }
    }
}

impl From<AuditError> for GatewayError {
    fn from(err: AuditError) -> Self {
        match err {
            AuditError::ChainCorrupted { entry_id, .. } => Self::AuditChainCorrupted { entry_id },
            other => Self::Audit(other),
        }
    }
}

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;
