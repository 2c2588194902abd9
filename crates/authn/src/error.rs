//! Authentication error types.
//!
//! This module defines errors that can occur while issuing, verifying and
//! revoking bearer tokens.

use medai_guard_storage::StorageError;
use thiserror::Error;

use crate::token::Role;

/// Authentication and authorization errors.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]`; new variants may be added in
/// future minor releases without a semver-breaking change. Downstream match
/// expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Token cannot be decoded or is missing a required claim.
    #[error("Invalid token format: {0}")]
    Malformed(String),

    /// Signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Algorithm not in allowed list.
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Token has expired.
    #[error("Token expired")]
    Expired,

    /// Token identifier has been revoked.
    #[error("Token revoked")]
    Revoked,

    /// Authenticated role does not satisfy the required role.
    #[error("Insufficient role: requires {required}, got {actual}")]
    InsufficientRole {
        /// Role the operation requires.
        required: Role,
        /// Role carried by the token.
        actual: Role,
    },

    /// Requested token lifetime is not usable.
    #[error("Invalid token lifetime: {0}")]
    InvalidTtl(String),

    /// Signing key material is unusable.
    #[error("Invalid signing key: {0}")]
    InvalidSigningKey(String),

    /// Token could not be signed.
    #[error("Token signing failed: {0}")]
    Signing(String),

    /// The revocation store could not be consulted.
    ///
    /// Wraps the original [`StorageError`] to preserve the full error source
    /// chain for debugging and structured logging.
    #[error("Revocation store unavailable: {0}")]
    RevocationUnavailable(
        /// The underlying storage error.
        #[source]
        StorageError,
    ),
}

impl AuthError {
    /// Creates a [`AuthError::Malformed`] error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        AuthError::Malformed(message.into())
    }

    /// Creates a [`AuthError::UnsupportedAlgorithm`] error.
    #[must_use]
    pub fn unsupported_algorithm(message: impl Into<String>) -> Self {
        AuthError::UnsupportedAlgorithm(message.into())
    }

    /// Creates a [`AuthError::InvalidTtl`] error.
    #[must_use]
    pub fn invalid_ttl(message: impl Into<String>) -> Self {
        AuthError::InvalidTtl(message.into())
    }

    /// Returns `true` for every failure that means "this token cannot be
    /// trusted" without being expired or revoked: bad structure, bad
    /// signature, or a disallowed algorithm.
    #[must_use]
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            AuthError::Malformed(_) | AuthError::InvalidSignature | AuthError::UnsupportedAlgorithm(_)
        )
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidToken => AuthError::malformed("Invalid token structure"),
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            ErrorKind::ExpiredSignature => AuthError::Expired,
            ErrorKind::InvalidAlgorithm => {
                AuthError::unsupported_algorithm("Algorithm not supported")
            },
            _ => AuthError::malformed(format!("JWT error: {err}")),
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::RevocationUnavailable(err)
    }
}

/// Result type alias for authentication operations.
pub type Result<T> = std::result::Result<T, AuthError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AuthError::malformed("test");
        assert_eq!(err.to_string(), "Invalid token format: test");

        assert_eq!(AuthError::Expired.to_string(), "Token expired");
        assert_eq!(AuthError::Revoked.to_string(), "Token revoked");

        let err = AuthError::InsufficientRole { required: Role::Admin, actual: Role::User };
        assert_eq!(err.to_string(), "Insufficient role: requires admin, got user");
    }

    #[test]
    fn test_error_from_jsonwebtoken() {
        let jwt_err =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::ExpiredSignature);
        assert!(matches!(AuthError::from(jwt_err), AuthError::Expired));

        let jwt_err =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidSignature);
        assert!(matches!(AuthError::from(jwt_err), AuthError::InvalidSignature));

        let jwt_err =
            jsonwebtoken::errors::Error::from(jsonwebtoken::errors::ErrorKind::InvalidAlgorithm);
        assert!(matches!(AuthError::from(jwt_err), AuthError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn test_malformed_classification() {
        assert!(AuthError::malformed("x").is_malformed());
        assert!(AuthError::InvalidSignature.is_malformed());
        assert!(AuthError::unsupported_algorithm("none").is_malformed());
        assert!(!AuthError::Expired.is_malformed());
        assert!(!AuthError::Revoked.is_malformed());
    }

    #[test]
    fn test_revocation_error_preserves_source_chain() {
        use std::error::Error;

        let auth_err: AuthError = StorageError::connection("connection refused").into();
        assert!(matches!(auth_err, AuthError::RevocationUnavailable(_)));

        let source = auth_err.source().expect("source chain must be preserved");
        assert_eq!(source.to_string(), "Connection error: connection refused");
    }
}
