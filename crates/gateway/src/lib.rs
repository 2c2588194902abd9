//! # MedAI Guard
//!
//! The request-facing security gate of the MedAI inference backend.
//!
//! A request is first counted against its caller's quota
//! ([`SecurityGateway::check_rate_limit`]), then its bearer token is verified
//! and checked against the revocation list
//! ([`SecurityGateway::authenticate`]). Once a sensitive action completes,
//! the application records it in the hash-chained audit trail
//! ([`SecurityGateway::record_audit`]).
//!
//! All three share one [`KeyValueStore`]: Redis when reachable, otherwise an
//! in-process fallback chosen once at startup.
//!
//! ## Example
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//! use medai_guard::{GuardConfig, SecurityGateway};
//! use medai_guard_authn::{Role, SigningKey};
//! use medai_guard_storage::{MemoryStore, RateLimitConfig};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let config = GuardConfig::builder()
//!     .signing_key(Arc::new(SigningKey::generate()))
//!     .rate_limit(RateLimitConfig::new(100, Duration::from_secs(60)).unwrap())
//!     .build();
//! let gateway = SecurityGateway::builder()
//!     .config(&config)
//!     .store(Arc::new(MemoryStore::new()))
//!     .build();
//!
//! let issued = gateway.login("alice", Role::User).await.unwrap();
//! gateway.check_rate_limit("alice").await.unwrap();
//! let identity = gateway.authenticate(&issued.token).await.unwrap();
//! assert_eq!(identity.sub, "alice");
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Environment configuration.
pub mod config;
/// Caller-facing errors.
pub mod error;
/// Log output setup.
pub mod telemetry;

use std::{sync::Arc, time::Duration};

pub use config::{Environment, GuardConfig};
pub use error::{ErrorBody, GatewayError, Result, UNAUTHORIZED_MESSAGE};
use medai_guard_audit::{
    AuditAction, AuditEntry, AuditRecord, AuditTrail, JsonlFileSink, Outcome,
};
use medai_guard_authn::{
    AuthError, Authenticator, IssuedToken, RevocationService, Role, TokenClaims, TokenIssuer,
    TokenVerifier,
};
use medai_guard_storage::{
    Clock, FixedWindowLimiter, KeyValueStore, MeteredStore, RateDecision,
    RateLimitMetricsSnapshot, StoreKind, StoreMetrics, StoreMetricsSnapshot, SystemClock,
    connect_store,
};
use serde_json::{Map, Value, json};

/// An authenticated caller.
pub type Identity = TokenClaims;

/// Resource type recorded for login and logout events.
const USER_RESOURCE: &str = "USER";

/// Resource type recorded for token revocations.
const TOKEN_RESOURCE: &str = "TOKEN";

/// Authentication, rate limiting and audit recording behind one handle.
///
/// Share one instance across workers behind an [`Arc`].
pub struct SecurityGateway {
    issuer: TokenIssuer,
    authenticator: Authenticator,
    limiter: FixedWindowLimiter,
    trail: Arc<AuditTrail>,
    store: Arc<dyn KeyValueStore>,
    store_metrics: StoreMetrics,
}

impl std::fmt::Debug for SecurityGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityGateway")
            .field("store", &self.store.kind())
            .field("store_metrics", &self.store_metrics.snapshot())
            .field("limiter", &self.limiter)
            .field("audit_entries", &self.trail.len())
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl SecurityGateway {
    /// Assembles a gateway from already-constructed parts.
    ///
    /// `clock` defaults to the system clock and drives token expiry and rate
    /// limit windows. Without a `trail`, an in-memory one is created using
    /// the same clock. `store` is wrapped in a [`MeteredStore`] whose
    /// counters are exposed by [`store_metrics`](Self::store_metrics).
    #[builder]
    pub fn new(
        config: &GuardConfig,
        store: Arc<dyn KeyValueStore>,
        trail: Option<Arc<AuditTrail>>,
        clock: Option<Arc<dyn Clock>>,
    ) -> Self {
        let clock: Arc<dyn Clock> = clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metered = MeteredStore::new(store);
        let store_metrics = metered.metrics().clone();
        let store: Arc<dyn KeyValueStore> = Arc::new(metered);
        let trail = trail
            .unwrap_or_else(|| Arc::new(AuditTrail::new().with_clock(Arc::clone(&clock))));

        let issuer = TokenIssuer::new(Arc::clone(&config.signing_key))
            .with_clock(Arc::clone(&clock))
            .with_default_ttl(config.token_ttl);
        let verifier =
            TokenVerifier::new(Arc::clone(&config.signing_key)).with_clock(Arc::clone(&clock));
        let revocation = RevocationService::new(Arc::clone(&store))
            .with_failure_policy(config.revocation_policy);
        let limiter = FixedWindowLimiter::new(Arc::clone(&store), config.rate_limit)
            .with_clock(clock)
            .with_failure_policy(config.rate_limit_policy);

        Self {
            issuer,
            authenticator: Authenticator::new(verifier, revocation),
            limiter,
            trail,
            store,
            store_metrics,
        }
    }
}

impl SecurityGateway {
    /// Connects the store (falling back to memory when unreachable), opens
    /// the audit trail and verifies its chain.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Audit`] if the audit file cannot be opened or read
    /// - [`GatewayError::AuditChainCorrupted`] if the existing chain fails
    ///   verification; appending to it would extend a broken chain
    pub async fn from_config(config: &GuardConfig) -> Result<Self> {
        let store = connect_store(&config.store).await;

        let trail = match &config.audit_path {
            Some(path) => {
                let sink = JsonlFileSink::open(path).await?;
                AuditTrail::open(Arc::new(sink)).await?
            },
            None => AuditTrail::new(),
        };
        let entries = trail.verify_chain()?;

        tracing::info!(
            environment = %config.environment,
            store = ?store.kind(),
            audit_entries = entries,
            rate_limit = config.rate_limit.limit(),
            rate_window_secs = config.rate_limit.window().as_secs(),
            "security gateway ready"
        );

        Ok(Self::builder().config(config).store(store).trail(Arc::new(trail)).build())
    }

    /// Verifies a bearer token and checks it has not been revoked.
    ///
    /// # Errors
    ///
    /// [`GatewayError::TokenExpired`], [`GatewayError::TokenMalformed`] or
    /// [`GatewayError::TokenRevoked`], all with the same public message, or
    /// [`GatewayError::StoreUnavailable`] under a fail-closed revocation
    /// policy.
    pub async fn authenticate(&self, token: &str) -> Result<Identity> {
        self.authenticator.authenticate(token).await.map_err(|e| {
            tracing::debug!(reason = %e, "authentication rejected");
            GatewayError::from(e)
        })
    }

    /// Counts one request from `identity` against its quota.
    ///
    /// # Errors
    ///
    /// [`GatewayError::RateLimited`] with the time until the next window, or
    /// [`GatewayError::StoreUnavailable`] under a fail-closed policy.
    pub async fn check_rate_limit(&self, identity: &str) -> Result<RateDecision> {
        Ok(self.limiter.check(identity).await?)
    }

    /// Appends a record to the audit trail.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Audit`] if the record is invalid or cannot be
    /// persisted.
    pub async fn record_audit(&self, record: AuditRecord) -> Result<AuditEntry> {
        Ok(self.trail.append(record).await?)
    }

    /// Issues a token with the configured lifetime and audits the login.
    ///
    /// # Errors
    ///
    /// See [`login_with_ttl`](Self::login_with_ttl).
    pub async fn login(&self, subject: &str, role: Role) -> Result<IssuedToken> {
        self.login_with_ttl(subject, role, self.issuer.default_ttl()).await
    }

    /// Issues a token valid for `ttl` and audits the login.
    ///
    /// A refused issuance is audited as a failed `LOGIN` before the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// [`GatewayError::TokenMalformed`] for an empty subject,
    /// [`GatewayError::Internal`] for a sub-second `ttl`, or an audit error.
    pub async fn login_with_ttl(
        &self,
        subject: &str,
        role: Role,
        ttl: Duration,
    ) -> Result<IssuedToken> {
        match self.issuer.issue(subject, role, ttl) {
            Ok(issued) => {
                let details = detail_map(json!({
                    "role": role.as_str(),
                    "token_id": &issued.claims.jti,
                    "expires_at": issued.claims.exp,
                }));
                self.audit_user_event(AuditAction::Login, subject, Outcome::Success, details)
                    .await?;
                Ok(issued)
            },
            Err(e) => {
                if !subject.is_empty() {
                    let details = detail_map(json!({ "reason": e.to_string() }));
                    self.audit_user_event(AuditAction::Login, subject, Outcome::Failure, details)
                        .await?;
                }
                Err(e.into())
            },
        }
    }

    /// Revokes a token for the rest of its lifetime and audits it.
    ///
    /// Returns `false` without auditing when the token has already expired.
    ///
    /// # Errors
    ///
    /// Token verification errors other than expiry, or
    /// [`GatewayError::StoreUnavailable`] if the revocation cannot be stored.
    pub async fn logout(&self, token: &str) -> Result<bool> {
        let claims = match self.authenticator.verifier().verify(token) {
            Ok(claims) => claims,
            Err(AuthError::Expired) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let revoked = self.authenticator.revoke_token(token).await?;
        if revoked {
            let record = AuditRecord::builder()
                .action(AuditAction::TokenRevoked)
                .actor(claims.sub.clone())
                .resource_type(TOKEN_RESOURCE)
                .resource_id(claims.jti.clone())
                .outcome(Outcome::Success)
                .details(detail_map(json!({ "reason": "logout" })))
                .build();
            self.trail.append(record).await?;
        }
        Ok(revoked)
    }

    /// Checks that `identity` carries at least `required`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::InsufficientRole`].
    pub fn require_role(&self, identity: &Identity, required: Role) -> Result<()> {
        Ok(Authenticator::require_role(identity, required)?)
    }

    /// Re-verifies the whole audit chain.
    ///
    /// Returns the number of verified entries.
    ///
    /// # Errors
    ///
    /// [`GatewayError::AuditChainCorrupted`] naming the first bad entry.
    pub fn verify_audit_chain(&self) -> Result<usize> {
        self.trail.verify_chain().map_err(|e| {
            tracing::error!(error = %e, "audit chain verification failed");
            GatewayError::from(e)
        })
    }

    /// The audit trail.
    #[must_use]
    pub fn audit_trail(&self) -> &Arc<AuditTrail> {
        &self.trail
    }

    /// Which store backs revocation and rate limiting.
    #[must_use]
    pub fn store_kind(&self) -> StoreKind {
        self.store.kind()
    }

    /// Rate limiter counters.
    #[must_use]
    pub fn rate_limit_metrics(&self) -> RateLimitMetricsSnapshot {
        self.limiter.metrics_snapshot()
    }

    /// Per-operation counters for the shared store.
    #[must_use]
    pub fn store_metrics(&self) -> StoreMetricsSnapshot {
        self.store_metrics.snapshot()
    }

    async fn audit_user_event(
        &self,
        action: AuditAction,
        subject: &str,
        outcome: Outcome,
        details: Map<String, Value>,
    ) -> Result<AuditEntry> {
        let record = AuditRecord::builder()
            .action(action)
            .actor(subject)
            .resource_type(USER_RESOURCE)
            .resource_id(subject)
            .outcome(outcome)
            .details(details)
            .build();
        Ok(self.trail.append(record).await?)
    }
}

fn detail_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
