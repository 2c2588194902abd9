//! Store-backed token revocation.
//!
//! Revoking a token writes `revoked:{jti}` to the shared [`KeyValueStore`]
//! with a TTL equal to the token's remaining lifetime, so the marker is
//! dropped by the store exactly when the token would have been rejected as
//! expired anyway. A revoked identifier stays revoked until then.
//!
//! # Failure policy
//!
//! When the store cannot be read, [`RevocationFailurePolicy::FailOpen`]
//! (the default) treats the token as not revoked and logs a warning;
//! [`RevocationFailurePolicy::FailClosed`] surfaces
//! [`AuthError::RevocationUnavailable`]. Writes always surface their error.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use medai_guard_storage::KeyValueStore;

use crate::error::{AuthError, Result};

/// Key prefix for revocation markers.
pub const REVOCATION_KEY_PREFIX: &str = "revoked";

/// What [`RevocationService::is_revoked`] does when the store fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RevocationFailurePolicy {
    /// Treat the token as live and log a warning.
    #[default]
    FailOpen,
    /// Return [`AuthError::RevocationUnavailable`].
    FailClosed,
}

/// Returns the store key for a token identifier.
#[must_use]
pub fn revocation_key(jti: &str) -> String {
    format!("{REVOCATION_KEY_PREFIX}:{jti}")
}

/// Records and checks revoked token identifiers.
#[derive(Clone)]
pub struct RevocationService {
    store: Arc<dyn KeyValueStore>,
    policy: RevocationFailurePolicy,
}

impl std::fmt::Debug for RevocationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevocationService")
            .field("store", &self.store.kind())
            .field("policy", &self.policy)
            .finish()
    }
}

impl RevocationService {
    /// Creates a service with [`RevocationFailurePolicy::FailOpen`].
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store, policy: RevocationFailurePolicy::default() }
    }

    /// Sets the behaviour on store read failure.
    #[must_use]
    pub fn with_failure_policy(mut self, policy: RevocationFailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the configured failure policy.
    #[must_use]
    pub fn failure_policy(&self) -> RevocationFailurePolicy {
        self.policy
    }

    /// Marks `jti` revoked for `remaining`.
    ///
    /// A zero `remaining` is a no-op: the token is already expired and the
    /// marker would never be consulted. Returns whether a marker was written.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RevocationUnavailable`] if the store write fails.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn revoke(&self, jti: &str, remaining: Duration) -> Result<bool> {
        if remaining.is_zero() {
            tracing::debug!(jti, "token already expired; nothing to revoke");
            return Ok(false);
        }
        self.store.set(&revocation_key(jti), Bytes::from_static(b"1"), Some(remaining)).await?;
        tracing::info!(jti, ttl_ms = remaining.as_millis() as u64, "token revoked");
        Ok(true)
    }

    /// Returns `true` if `jti` carries a live revocation marker.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RevocationUnavailable`] on store failure when the
    /// policy is [`RevocationFailurePolicy::FailClosed`].
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn is_revoked(&self, jti: &str) -> Result<bool> {
        match self.store.get(&revocation_key(jti)).await {
            Ok(marker) => Ok(marker.is_some()),
            Err(e) => match self.policy {
                RevocationFailurePolicy::FailOpen => {
                    tracing::warn!(jti, error = %e, "revocation check failed; treating token as not revoked");
                    Ok(false)
                },
                RevocationFailurePolicy::FailClosed => {
                    tracing::error!(jti, error = %e, "revocation check failed; rejecting token");
                    Err(AuthError::RevocationUnavailable(e))
                },
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use medai_guard_storage::{MemoryStore, testutil::FailingStore};

    use super::*;

    #[test]
    fn test_revocation_key_format() {
        assert_eq!(revocation_key("abc123"), "revoked:abc123");
    }

    #[tokio::test]
    async fn test_revoke_then_is_revoked() {
        let service = RevocationService::new(Arc::new(MemoryStore::new()));
        assert!(!service.is_revoked("j1").await.unwrap());
        assert!(service.revoke("j1", Duration::from_secs(30)).await.unwrap());
        assert!(service.is_revoked("j1").await.unwrap());
        assert!(!service.is_revoked("j2").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_ttl_matches_remaining_lifetime() {
        let store = MemoryStore::new();
        let service = RevocationService::new(Arc::new(store.clone()));
        service.revoke("j1", Duration::from_secs(30)).await.unwrap();

        let ttl = store.ttl("revoked:j1").expect("marker should carry a ttl");
        assert!(ttl <= Duration::from_secs(30));
        assert!(ttl > Duration::from_secs(29));
    }

    #[tokio::test]
    async fn test_revoke_zero_remaining_is_noop() {
        let store = MemoryStore::new();
        let service = RevocationService::new(Arc::new(store.clone()));
        assert!(!service.revoke("j1", Duration::ZERO).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_marker_expires_with_token() {
        let service = RevocationService::new(Arc::new(MemoryStore::new()));
        service.revoke("j1", Duration::from_millis(20)).await.unwrap();
        assert!(service.is_revoked("j1").await.unwrap());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!service.is_revoked("j1").await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_open_by_default() {
        let service = RevocationService::new(Arc::new(FailingStore::default()));
        assert_eq!(service.failure_policy(), RevocationFailurePolicy::FailOpen);
        assert!(!service.is_revoked("j1").await.unwrap());
    }

    #[tokio::test]
    async fn test_fail_closed_surfaces_error() {
        let service = RevocationService::new(Arc::new(FailingStore::default()))
            .with_failure_policy(RevocationFailurePolicy::FailClosed);
        assert!(matches!(
            service.is_revoked("j1").await,
            Err(AuthError::RevocationUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_write_failure_always_surfaces() {
        let service = RevocationService::new(Arc::new(FailingStore::default()));
        assert!(matches!(
            service.revoke("j1", Duration::from_secs(5)).await,
            Err(AuthError::RevocationUnavailable(_))
        ));
    }
}
