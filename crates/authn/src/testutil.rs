//! Shared test utilities for authentication testing.
//!
//! This module provides helpers for building signing keys, signing arbitrary
//! claim sets, and crafting raw token strings (for attack testing). It is
//! feature-gated behind `testutil` to prevent leaking into production builds.
//!
//! # Usage
//!
//! In integration tests, enable the feature in `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! medai-guard-authn = { path = "../authn", features = ["testutil"] }
//! ```
//!
//! Then import helpers:
//!
//! ```no_run
//! // Requires the `testutil` feature to be enabled.
//! use medai_guard_authn::testutil::{TEST_SECRET, craft_raw_jwt, sign_claims};
//! ```

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header};

use crate::token::SigningKey;

/// A fixed 32-byte HMAC secret.
pub const TEST_SECRET: &[u8; 32] = b"medai-guard-test-secret-32-bytes";

/// A [`SigningKey`] over [`TEST_SECRET`].
///
/// # Panics
///
/// Never; [`TEST_SECRET`] meets the minimum length.
#[must_use]
pub fn test_signing_key() -> Arc<SigningKey> {
    Arc::new(SigningKey::new(TEST_SECRET.to_vec()).expect("test secret is long enough"))
}

/// Signs an arbitrary claim set with `secret` under HMAC algorithm `alg`.
///
/// Bypasses every check [`TokenIssuer`](crate::token::TokenIssuer) applies,
/// so tests can produce tokens with missing or hostile claims.
///
/// # Panics
///
/// Panics if encoding fails or `alg` is not an HMAC algorithm.
pub fn sign_claims(claims: &serde_json::Value, alg: Algorithm, secret: &[u8]) -> String {
    jsonwebtoken::encode(&Header::new(alg), claims, &EncodingKey::from_secret(secret))
        .expect("Failed to encode test token")
}

/// Creates a raw token string from arbitrary header and payload JSON.
///
/// The result has the structure `{header_b64}.{payload_b64}.{signature}`.
/// Pass an empty `signature` to reproduce an unsigned token.
///
/// # Panics
///
/// Panics if JSON serialization fails.
pub fn craft_raw_jwt(
    header_json: &serde_json::Value,
    payload_json: &serde_json::Value,
    signature: &str,
) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header_json).expect("header json"));
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{header_b64}.{payload_b64}.{signature}")
}

/// Replaces the payload segment of `token`, keeping its header and signature.
///
/// # Panics
///
/// Panics if `token` does not have three segments.
pub fn swap_payload(token: &str, payload_json: &serde_json::Value) -> String {
    let parts: Vec<&str> = token.split('.').collect();
    assert_eq!(parts.len(), 3, "token must have three segments");
    let payload_b64 =
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(payload_json).expect("payload json"));
    format!("{}.{payload_b64}.{}", parts[0], parts[2])
}

/// Asserts that a [`Result<T, AuthError>`](crate::error::AuthError) is an
/// `Err` matching the given variant.
///
/// # Examples
///
/// ```no_run
/// // Requires the `testutil` feature to be enabled.
/// use medai_guard_authn::assert_auth_error;
/// use medai_guard_authn::error::AuthError;
///
/// let result: Result<(), AuthError> = Err(AuthError::Expired);
/// assert_auth_error!(result, Expired);
/// ```
#[macro_export]
macro_rules! assert_auth_error {
    ($result:expr, $variant:ident) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "expected AuthError::{}, got: {:?}",
            stringify!($variant),
            $result,
        );
    };
    ($result:expr, $variant:ident, $msg:expr) => {
        assert!(
            matches!($result, Err($crate::error::AuthError::$variant { .. })),
            "{}: expected AuthError::{}, got: {:?}",
            $msg,
            stringify!($variant),
            $result,
        );
    };
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::validation::header_algorithm;

    #[test]
    fn test_craft_raw_jwt_structure() {
        let token = craft_raw_jwt(&json!({"alg": "none"}), &json!({"sub": "x"}), "");
        assert_eq!(token.split('.').count(), 3);
        assert!(token.ends_with('.'));
        assert_eq!(header_algorithm(&token).expect("alg"), "none");
    }

    #[test]
    fn test_sign_claims_uses_requested_algorithm() {
        let token = sign_claims(&json!({"sub": "x"}), Algorithm::HS512, TEST_SECRET);
        assert_eq!(header_algorithm(&token).expect("alg"), "HS512");
    }

    #[test]
    fn test_swap_payload_keeps_header_and_signature() {
        let token = sign_claims(&json!({"sub": "x"}), Algorithm::HS256, TEST_SECRET);
        let swapped = swap_payload(&token, &json!({"sub": "y"}));
        let (a, b): (Vec<&str>, Vec<&str>) = (token.split('.').collect(), swapped.split('.').collect());
        assert_eq!(a[0], b[0]);
        assert_eq!(a[2], b[2]);
        assert_ne!(a[1], b[1]);
    }
}
