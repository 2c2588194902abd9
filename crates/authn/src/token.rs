//! Token issuance, verification and claims.
//!
//! Tokens are compact JWS strings signed with HMAC-SHA256 over a shared
//! secret. Every token carries a subject, a [`Role`], a 128-bit random
//! token identifier (`jti`), and issue and expiry timestamps in whole
//! seconds since the Unix epoch.
//!
//! # Example
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//! use medai_guard_authn::token::{Role, SigningKey, TokenIssuer, TokenVerifier};
//!
//! let key = Arc::new(SigningKey::new(vec![7u8; 32]).unwrap());
//! let issuer = TokenIssuer::new(Arc::clone(&key));
//! let verifier = TokenVerifier::new(key);
//!
//! let issued = issuer.issue("alice", Role::User, Duration::from_secs(60)).unwrap();
//! let claims = verifier.verify(&issued.token).unwrap();
//! assert_eq!(claims.sub, "alice");
//! assert_eq!(claims.role, Role::User);
//! ```

use std::{fmt, str::FromStr, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use medai_guard_storage::{Clock, SystemClock};
use rand::{RngCore, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::{
    error::{AuthError, Result},
    validation::{header_algorithm, validate_algorithm},
};

/// Minimum signing secret length in bytes.
pub const MIN_SIGNING_KEY_LEN: usize = 32;

/// Number of random bytes in a generated token identifier.
pub const JTI_BYTES: usize = 16;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Authorization role carried by a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access; satisfies every role requirement.
    Admin,
    /// Interactive end user.
    User,
    /// Machine-to-machine caller.
    Service,
}

impl Role {
    /// Returns the wire name of the role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
            Role::Service => "service",
        }
    }

    /// Returns `true` if a holder of `self` may perform an operation that
    /// requires `required`.
    #[must_use]
    pub fn satisfies(self, required: Role) -> bool {
        self == Role::Admin || self == required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" => Ok(Role::Admin),
            "user" => Ok(Role::User),
            "service" => Ok(Role::Service),
            other => Err(AuthError::malformed(format!("unknown role '{other}'"))),
        }
    }
}

/// Verified token claims.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the authenticated principal.
    pub sub: String,
    /// Authorization role.
    pub role: Role,
    /// Unique token identifier used as the revocation key.
    pub jti: String,
    /// Issued at (seconds since epoch).
    pub iat: i64,
    /// Expiration time (seconds since epoch).
    pub exp: i64,
}

impl TokenClaims {
    /// Returns the expiry instant.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Returns `true` once `now` has reached the expiry instant.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp_millis() >= self.exp.saturating_mul(1000)
    }

    /// Time left until expiry, or zero if already expired.
    #[must_use]
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Duration {
        let left_ms = self.exp.saturating_mul(1000).saturating_sub(now.timestamp_millis());
        Duration::from_millis(u64::try_from(left_ms).unwrap_or(0))
    }
}

/// Claims as they appear on the wire; every field is checked before use.
#[derive(Deserialize)]
struct WireClaims {
    sub: Option<String>,
    role: Option<String>,
    jti: Option<String>,
    iat: Option<i64>,
    exp: Option<i64>,
}

impl WireClaims {
    fn into_claims(self, token: &str) -> Result<TokenClaims> {
        let sub = self
            .sub
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AuthError::malformed("missing 'sub' claim"))?;
        let role = self.role.ok_or_else(|| AuthError::malformed("missing 'role' claim"))?.parse()?;
        let exp = self.exp.ok_or_else(|| AuthError::malformed("missing 'exp' claim"))?;
        let jti = match self.jti.filter(|j| !j.is_empty()) {
            Some(jti) => jti,
            None => derived_jti(token),
        };
        Ok(TokenClaims { sub, role, jti, iat: self.iat.unwrap_or(0), exp })
    }
}

/// Stable identifier for tokens minted without a `jti` claim.
fn derived_jti(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_jti() -> String {
    let mut bytes = [0u8; JTI_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// HMAC signing secret.
///
/// The bytes are zeroed on drop and never printed.
pub struct SigningKey {
    secret: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey").field("len", &self.secret.len()).finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Wraps an existing secret.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidSigningKey`] if the secret is shorter than
    /// [`MIN_SIGNING_KEY_LEN`] bytes.
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self> {
        let secret = Zeroizing::new(secret.into());
        if secret.len() < MIN_SIGNING_KEY_LEN {
            return Err(AuthError::InvalidSigningKey(format!(
                "signing key must be at least {MIN_SIGNING_KEY_LEN} bytes, got {}",
                secret.len()
            )));
        }
        Ok(Self { secret })
    }

    /// Generates a random secret of [`MIN_SIGNING_KEY_LEN`] bytes.
    #[must_use]
    pub fn generate() -> Self {
        let mut secret = Zeroizing::new(vec![0u8; MIN_SIGNING_KEY_LEN]);
        OsRng.fill_bytes(&mut secret);
        Self { secret }
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(&self.secret)
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(&self.secret)
    }
}

/// A freshly minted token and the claims it carries.
#[derive(Clone, Debug)]
pub struct IssuedToken {
    /// Compact serialized token.
    pub token: String,
    /// Claims embedded in the token.
    pub claims: TokenClaims,
}

/// Mints signed tokens.
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    key: Arc<SigningKey>,
    clock: Arc<dyn Clock>,
    default_ttl: Duration,
}

impl TokenIssuer {
    /// Creates an issuer using the system clock and [`DEFAULT_TOKEN_TTL`].
    #[must_use]
    pub fn new(key: Arc<SigningKey>) -> Self {
        Self { key, clock: Arc::new(SystemClock), default_ttl: DEFAULT_TOKEN_TTL }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the lifetime used by [`issue_default`](Self::issue_default).
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Returns the default token lifetime.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Issues a token for `subject` valid for `ttl`, truncated to whole seconds.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Malformed`] if `subject` is empty
    /// - [`AuthError::InvalidTtl`] if `ttl` is shorter than one second
    /// - [`AuthError::Signing`] if encoding fails
    pub fn issue(&self, subject: &str, role: Role, ttl: Duration) -> Result<IssuedToken> {
        if subject.is_empty() {
            return Err(AuthError::malformed("subject must not be empty"));
        }
        let ttl_secs = i64::try_from(ttl.as_secs())
            .map_err(|_| AuthError::invalid_ttl("token lifetime is too large"))?;
        if ttl_secs == 0 {
            return Err(AuthError::invalid_ttl("token lifetime must be at least one second"));
        }

        let iat = self.clock.now().timestamp();
        let claims = TokenClaims {
            sub: subject.to_owned(),
            role,
            jti: generate_jti(),
            iat,
            exp: iat.saturating_add(ttl_secs),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.key.encoding_key())
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        tracing::debug!(sub = %claims.sub, role = %claims.role, jti = %claims.jti, exp = claims.exp, "token issued");
        Ok(IssuedToken { token, claims })
    }

    /// Issues a token with the default lifetime.
    ///
    /// # Errors
    ///
    /// See [`issue`](Self::issue).
    pub fn issue_default(&self, subject: &str, role: Role) -> Result<IssuedToken> {
        self.issue(subject, role, self.default_ttl)
    }
}

/// Checks token signatures, algorithms and expiry.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    key: Arc<SigningKey>,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    /// Creates a verifier using the system clock.
    #[must_use]
    pub fn new(key: Arc<SigningKey>) -> Self {
        Self { key, clock: Arc::new(SystemClock) }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Returns the time source.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Verifies `token` and returns its claims.
    ///
    /// The algorithm header is checked before the signature, and the
    /// signature before the claims, so a forged token is never reported as
    /// merely expired.
    ///
    /// # Errors
    ///
    /// - [`AuthError::UnsupportedAlgorithm`] for `none` or any algorithm
    ///   other than HS256
    /// - [`AuthError::InvalidSignature`] if the signature does not match
    /// - [`AuthError::Malformed`] for structural problems, a missing `sub`,
    ///   `role` or `exp`, or an unknown role
    /// - [`AuthError::Expired`] once the clock reaches `exp`
    pub fn verify(&self, token: &str) -> Result<TokenClaims> {
        let alg = header_algorithm(token)?;
        validate_algorithm(&alg)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<WireClaims>(token, &self.key.decoding_key(), &validation)?;
        let claims = data.claims.into_claims(token)?;

        if claims.is_expired_at(self.clock.now()) {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }
}
