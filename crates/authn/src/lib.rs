//! # MedAI Guard Authentication
//!
//! Bearer token issuance, verification and revocation for the MedAI
//! security gateway.
//!
//! This crate provides:
//! - **Tokens**: HMAC-SHA256 signed claims carrying subject, role, a 128-bit
//!   identifier and issue/expiry timestamps
//! - **Algorithm validation**: `none` and every algorithm other than HS256
//!   are rejected before signature checks
//! - **Revocation**: `revoked:{jti}` markers in the shared key-value store,
//!   expiring with the token
//!
//! ## Example
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//! use medai_guard_authn::{
//!     Authenticator, RevocationService, Role, SigningKey, TokenIssuer, TokenVerifier,
//! };
//! use medai_guard_storage::MemoryStore;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let key = Arc::new(SigningKey::generate());
//! let issuer = TokenIssuer::new(Arc::clone(&key));
//! let auth = Authenticator::new(
//!     TokenVerifier::new(key),
//!     RevocationService::new(Arc::new(MemoryStore::new())),
//! );
//!
//! let issued = issuer.issue("alice", Role::User, Duration::from_secs(60)).unwrap();
//! assert!(auth.authenticate(&issued.token).await.is_ok());
//!
//! auth.revoke_token(&issued.token).await.unwrap();
//! assert!(auth.authenticate(&issued.token).await.is_err());
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Verification plus revocation.
pub mod authenticator;
/// Authentication error types.
pub mod error;
/// Store-backed token revocation.
pub mod revocation;
#[cfg(any(test, feature = "testutil"))]
#[allow(clippy::expect_used, clippy::panic)]
pub mod testutil;
/// Token issuance and verification.
pub mod token;
/// Algorithm validation.
pub mod validation;

// Re-export key types for convenience
pub use authenticator::Authenticator;
pub use error::{AuthError, Result};
pub use revocation::{REVOCATION_KEY_PREFIX, RevocationFailurePolicy, RevocationService};
pub use token::{
    DEFAULT_TOKEN_TTL, IssuedToken, Role, SigningKey, TokenClaims, TokenIssuer, TokenVerifier,
};
pub use validation::{ACCEPTED_ALGORITHMS, FORBIDDEN_ALGORITHMS, validate_algorithm};
