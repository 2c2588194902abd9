//! Token authentication pipeline.
//!
//! [`Authenticator`] combines a [`TokenVerifier`] with a
//! [`RevocationService`]. Signature, algorithm and expiry are checked
//! first; only a token that passes all three costs a store round trip.

use medai_guard_storage::Clock;

use crate::{
    error::{AuthError, Result},
    revocation::RevocationService,
    token::{Role, TokenClaims, TokenVerifier},
};

/// Verifies tokens and checks them against the revocation list.
#[derive(Debug, Clone)]
pub struct Authenticator {
    verifier: TokenVerifier,
    revocation: RevocationService,
}

impl Authenticator {
    /// Creates an authenticator.
    #[must_use]
    pub fn new(verifier: TokenVerifier, revocation: RevocationService) -> Self {
        Self { verifier, revocation }
    }

    /// Returns the underlying verifier.
    #[must_use]
    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    /// Returns the underlying revocation service.
    #[must_use]
    pub fn revocation(&self) -> &RevocationService {
        &self.revocation
    }

    /// Authenticates a bearer token.
    ///
    /// # Errors
    ///
    /// Any [`TokenVerifier::verify`] error, [`AuthError::Revoked`] if the
    /// token identifier is revoked, or [`AuthError::RevocationUnavailable`]
    /// under a fail-closed revocation policy.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn authenticate(&self, token: &str) -> Result<TokenClaims> {
        let claims = self.verifier.verify(token)?;
        if self.revocation.is_revoked(&claims.jti).await? {
            tracing::debug!(sub = %claims.sub, jti = %claims.jti, "revoked token presented");
            return Err(AuthError::Revoked);
        }
        Ok(claims)
    }

    /// Revokes a token for the rest of its lifetime.
    ///
    /// Revoking an already-expired token is a no-op and returns `false`.
    /// Revoking an already-revoked token refreshes its marker.
    ///
    /// # Errors
    ///
    /// Verification errors other than expiry, or
    /// [`AuthError::RevocationUnavailable`] if the marker cannot be written.
    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn revoke_token(&self, token: &str) -> Result<bool> {
        let claims = match self.verifier.verify(token) {
            Ok(claims) => claims,
            Err(AuthError::Expired) => return Ok(false),
            Err(e) => return Err(e),
        };
        let remaining = claims.remaining_lifetime(self.verifier.clock().now());
        self.revocation.revoke(&claims.jti, remaining).await
    }

    /// Checks that authenticated `claims` satisfy `required`.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InsufficientRole`] otherwise.
    pub fn require_role(claims: &TokenClaims, required: Role) -> Result<()> {
        if claims.role.satisfies(required) {
            Ok(())
        } else {
            Err(AuthError::InsufficientRole { required, actual: claims.role })
        }
    }
}
