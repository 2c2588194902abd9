//! Token algorithm validation.
//!
//! This module provides security checks for the `alg` header of incoming
//! tokens, ensuring only the configured HMAC algorithm is accepted.
//!
//! # Security
//!
//! These validators implement RFC 8725 recommendations:
//! - The header is inspected before any signature work, so `"none"` and
//!   algorithms the token library cannot even name are rejected uniformly
//! - Only HS256 is accepted; a token claiming any other algorithm is
//!   refused even if its signature would verify under that algorithm

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;

use crate::error::AuthError;

/// Forbidden algorithms that are never accepted, compared case-insensitively.
///
/// - `none`: No signature verification (trivially bypassable)
pub const FORBIDDEN_ALGORITHMS: &[&str] = &["none"];

/// Accepted token algorithms.
///
/// Tokens are signed with a shared HMAC secret. Asymmetric algorithms are
/// excluded so a public key can never be confused for the secret, and the
/// longer HMAC variants are excluded so there is exactly one verification
/// path.
pub const ACCEPTED_ALGORITHMS: &[&str] = &["HS256"];

#[derive(Deserialize)]
struct RawHeader {
    alg: String,
}

/// Extracts the `alg` header value without trusting the token.
///
/// # Errors
///
/// Returns [`AuthError::Malformed`] if the token does not have three
/// dot-separated segments or the header is not base64url-encoded JSON with
/// a string `alg` field.
pub fn header_algorithm(token: &str) -> Result<String, AuthError> {
    let mut parts = token.split('.');
    let (Some(header), Some(_), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(AuthError::malformed("token must have 3 parts separated by dots"));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(header)
        .map_err(|e| AuthError::malformed(format!("Failed to decode token header: {e}")))?;
    let raw: RawHeader = serde_json::from_slice(&bytes)
        .map_err(|e| AuthError::malformed(format!("Failed to parse token header: {e}")))?;
    Ok(raw.alg)
}

/// Validate a token algorithm against security policies.
///
/// # Errors
///
/// Returns [`AuthError::UnsupportedAlgorithm`] if:
/// - Algorithm is "none" (in any casing)
/// - Algorithm is not in [`ACCEPTED_ALGORITHMS`]
///
/// # Examples
///
/// ```
/// use medai_guard_authn::validation::validate_algorithm;
///
/// assert!(validate_algorithm("HS256").is_ok());
/// assert!(validate_algorithm("none").is_err());
/// assert!(validate_algorithm("RS256").is_err());
/// ```
pub fn validate_algorithm(alg: &str) -> Result<(), AuthError> {
    if FORBIDDEN_ALGORITHMS.iter().any(|f| f.eq_ignore_ascii_case(alg)) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not allowed for security reasons"
        )));
    }

    if !ACCEPTED_ALGORITHMS.contains(&alg) {
        return Err(AuthError::unsupported_algorithm(format!(
            "Algorithm '{alg}' is not in accepted list (only HS256 is supported)"
        )));
    }

    Ok(())
}
