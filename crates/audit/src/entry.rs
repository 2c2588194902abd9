//! Audit entries and their canonical hash.
//!
//! An entry's hash is `sha256(canonical_json(entry without entry_hash) ++
//! previous_hash)`, hex encoded. The canonical form is a JSON object with a
//! fixed field order, timestamps in RFC 3339 with microsecond precision and
//! a trailing `Z`, and object keys inside `details` sorted recursively.
//! Any change to that form must bump [`AUDIT_SCHEMA_VERSION`].

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{AuditError, AuditResult};

/// Version of the canonical serialization used for hashing.
pub const AUDIT_SCHEMA_VERSION: u32 = 1;

/// `previous_hash` of the first entry in every chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Security-relevant action recorded in the trail.
///
/// Serialized as its upper snake case name; names outside the well-known set
/// round-trip through [`AuditAction::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AuditAction {
    /// Successful or attempted login.
    Login,
    /// Explicit logout.
    Logout,
    /// A bearer token was minted.
    TokenIssued,
    /// A bearer token was revoked.
    TokenRevoked,
    /// A request was refused for lack of privilege.
    AccessDenied,
    /// A request was refused by the rate limiter.
    RateLimited,
    /// An inference request was accepted.
    InferenceRequested,
    /// An inference finished.
    InferenceCompleted,
    /// A model version was deployed.
    ModelDeployed,
    /// A medical image was uploaded.
    ImageUploaded,
    /// Any other action name.
    Custom(String),
}

impl AuditAction {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Login => "LOGIN",
            Self::Logout => "LOGOUT",
            Self::TokenIssued => "TOKEN_ISSUED",
            Self::TokenRevoked => "TOKEN_REVOKED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::RateLimited => "RATE_LIMITED",
            Self::InferenceRequested => "INFERENCE_REQUESTED",
            Self::InferenceCompleted => "INFERENCE_COMPLETED",
            Self::ModelDeployed => "MODEL_DEPLOYED",
            Self::ImageUploaded => "IMAGE_UPLOADED",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for AuditAction {
    fn from(name: String) -> Self {
        match name.as_str() {
            "LOGIN" => Self::Login,
            "LOGOUT" => Self::Logout,
            "TOKEN_ISSUED" => Self::TokenIssued,
            "TOKEN_REVOKED" => Self::TokenRevoked,
            "ACCESS_DENIED" => Self::AccessDenied,
            "RATE_LIMITED" => Self::RateLimited,
            "INFERENCE_REQUESTED" => Self::InferenceRequested,
            "INFERENCE_COMPLETED" => Self::InferenceCompleted,
            "MODEL_DEPLOYED" => Self::ModelDeployed,
            "IMAGE_UPLOADED" => Self::ImageUploaded,
            _ => Self::Custom(name),
        }
    }
}

impl From<&str> for AuditAction {
    fn from(name: &str) -> Self {
        Self::from(name.to_owned())
    }
}

impl From<AuditAction> for String {
    fn from(action: AuditAction) -> Self {
        match action {
            AuditAction::Custom(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

/// Result of an audited action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// The action completed.
    #[default]
    Success,
    /// The action was attempted and failed or was refused.
    Failure,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("SUCCESS"),
            Self::Failure => f.write_str("FAILURE"),
        }
    }
}

/// One link of the hash chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Canonical serialization version this entry was hashed with.
    pub schema_version: u32,
    /// Unique entry identifier.
    pub entry_id: Uuid,
    /// UTC time of the append, non-decreasing within a trail.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    pub action: AuditAction,
    /// Who did it, when known.
    pub actor: Option<String>,
    /// Kind of resource affected.
    pub resource_type: String,
    /// Identifier of the resource affected.
    pub resource_id: String,
    /// Whether it succeeded.
    pub outcome: Outcome,
    /// Redacted free-form context.
    pub details: Map<String, Value>,
    /// `entry_hash` of the preceding entry, or [`GENESIS_HASH`].
    pub previous_hash: String,
    /// Hash over every other field.
    pub entry_hash: String,
}

/// Field-ordered view hashed for each entry.
#[derive(Serialize)]
struct Canonical<'a> {
    schema_version: u32,
    entry_id: &'a Uuid,
    timestamp: String,
    action: &'a str,
    actor: Option<&'a str>,
    resource_type: &'a str,
    resource_id: &'a str,
    outcome: Outcome,
    details: Value,
    previous_hash: &'a str,
}

/// Rebuilds objects with sorted keys so the bytes do not depend on map
/// ordering features.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                if let Some(v) = map.get(key) {
                    out.insert(key.clone(), sorted(v));
                }
            }
            Value::Object(out)
        },
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

/// Formats a timestamp the way it is hashed.
#[must_use]
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Chains `canonical` onto `previous_hash`.
#[must_use]
pub fn chain_hash(canonical: &[u8], previous_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical);
    hasher.update(previous_hash.as_bytes());
    hex::encode(hasher.finalize())
}

impl AuditEntry {
    /// Returns the canonical bytes hashed for this entry.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialization`] if encoding fails.
    pub fn canonical_bytes(&self) -> AuditResult<Vec<u8>> {
        let canonical = Canonical {
            schema_version: self.schema_version,
            entry_id: &self.entry_id,
            timestamp: canonical_timestamp(&self.timestamp),
            action: self.action.as_str(),
            actor: self.actor.as_deref(),
            resource_type: &self.resource_type,
            resource_id: &self.resource_id,
            outcome: self.outcome,
            details: sorted(&Value::Object(self.details.clone())),
            previous_hash: &self.previous_hash,
        };
        Ok(serde_json::to_vec(&canonical)?)
    }

    /// Recomputes this entry's hash from its fields.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialization`] if encoding fails.
    pub fn compute_hash(&self) -> AuditResult<String> {
        Ok(chain_hash(&self.canonical_bytes()?, &self.previous_hash))
    }

    /// Fills in `entry_hash` from the other fields.
    pub(crate) fn seal(mut self) -> AuditResult<Self> {
        self.entry_hash = self.compute_hash()?;
        Ok(self)
    }
}

/// Verifies a chain of entries in order, starting from [`GENESIS_HASH`].
///
/// Returns the hash of the last entry (the chain tail).
///
/// # Errors
///
/// Returns [`AuditError::ChainCorrupted`] for the first entry whose link,
/// schema version or recomputed hash does not match.
pub fn verify_entries(entries: &[AuditEntry]) -> AuditResult<String> {
    let mut expected_prev = GENESIS_HASH.to_owned();
    for (position, entry) in entries.iter().enumerate() {
        let corrupted = || AuditError::ChainCorrupted { entry_id: entry.entry_id, position };
        if entry.schema_version != AUDIT_SCHEMA_VERSION
            || entry.previous_hash != expected_prev
            || entry.compute_hash()? != entry.entry_hash
        {
            return Err(corrupted());
        }
        expected_prev.clone_from(&entry.entry_hash);
    }
    Ok(expected_prev)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry(previous_hash: &str, details: Value) -> AuditEntry {
        AuditEntry {
            schema_version: AUDIT_SCHEMA_VERSION,
            entry_id: Uuid::new_v4(),
            timestamp: DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap(),
            action: AuditAction::Login,
            actor: Some("alice".into()),
            resource_type: "USER".into(),
            resource_id: "alice".into(),
            outcome: Outcome::Success,
            details: details.as_object().cloned().unwrap_or_default(),
            previous_hash: previous_hash.into(),
            entry_hash: String::new(),
        }
        .seal()
        .unwrap()
    }

    #[test]
    fn genesis_is_64_zeros() {
        assert_eq!(GENESIS_HASH.len(), 64);
        assert!(GENESIS_HASH.chars().all(|c| c == '0'));
    }

    #[test]
    fn action_wire_names_round_trip() {
        assert_eq!(serde_json::to_string(&AuditAction::TokenRevoked).unwrap(), "\"TOKEN_REVOKED\"");
        let parsed: AuditAction = serde_json::from_str("\"INFERENCE_COMPLETED\"").unwrap();
        assert_eq!(parsed, AuditAction::InferenceCompleted);
        let custom: AuditAction = serde_json::from_str("\"EXPORT_REPORT\"").unwrap();
        assert_eq!(custom, AuditAction::Custom("EXPORT_REPORT".into()));
        assert_eq!(AuditAction::from("LOGIN"), AuditAction::Login);
    }

    #[test]
    fn outcome_wire_names() {
        assert_eq!(serde_json::to_string(&Outcome::Failure).unwrap(), "\"FAILURE\"");
    }

    #[test]
    fn canonical_timestamp_uses_micros() {
        let ts = DateTime::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(canonical_timestamp(&ts), "2023-11-14T22:13:20.123456Z");
    }

    #[test]
    fn hash_depends_on_previous_hash() {
        let a = entry(GENESIS_HASH, json!({}));
        let mut b = a.clone();
        b.previous_hash = "f".repeat(64);
        assert_ne!(a.entry_hash, b.compute_hash().unwrap());
    }

    #[test]
    fn hash_ignores_detail_key_order() {
        let a = entry(GENESIS_HASH, json!({"a": 1, "b": {"y": 2, "x": 3}}));
        let mut b = a.clone();
        let mut details = Map::new();
        details.insert("b".into(), json!({"x": 3, "y": 2}));
        details.insert("a".into(), json!(1));
        b.details = details;
        assert_eq!(a.entry_hash, b.compute_hash().unwrap());
    }

    #[test]
    fn verify_entries_accepts_valid_chain() {
        let first = entry(GENESIS_HASH, json!({}));
        let second = entry(&first.entry_hash, json!({"k": "v"}));
        let tail = verify_entries(&[first, second.clone()]).unwrap();
        assert_eq!(tail, second.entry_hash);
        assert_eq!(verify_entries(&[]).unwrap(), GENESIS_HASH);
    }

    #[test]
    fn verify_entries_detects_broken_link() {
        let first = entry(GENESIS_HASH, json!({}));
        let orphan = entry(GENESIS_HASH, json!({}));
        let err = verify_entries(&[first, orphan.clone()]).unwrap_err();
        assert!(matches!(err, AuditError::ChainCorrupted { position: 1, entry_id } if entry_id == orphan.entry_id));
    }

    #[test]
    fn verify_entries_rejects_unknown_schema() {
        let mut first = entry(GENESIS_HASH, json!({}));
        first.schema_version = 2;
        first = first.seal().unwrap();
        assert!(verify_entries(&[first]).is_err());
    }
}
