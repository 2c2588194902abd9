//! The hash-chained audit trail.
//!
//! Appends are serialized by a single async lock held from the moment the
//! tail hash is read until the new entry is persisted and becomes the tail,
//! so two concurrent appends can never link to the same predecessor.
//!
//! Persisting and committing a sealed entry runs on its own task. Dropping
//! an `append` future after that point does not stop the write, so the
//! in-memory tail cannot fall behind what the sink holds.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use medai_guard_storage::{Clock, SystemClock};
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    entry::{AUDIT_SCHEMA_VERSION, AuditAction, AuditEntry, GENESIS_HASH, Outcome, verify_entries},
    error::{AuditError, AuditResult},
    redact::PhiRedactor,
    sink::{AuditSink, MemorySink},
};

/// Input to [`AuditTrail::append`].
///
/// ```
/// use medai_guard_audit::{AuditAction, AuditRecord, Outcome};
///
/// let record = AuditRecord::builder()
///     .action(AuditAction::InferenceCompleted)
///     .actor("alice")
///     .resource_type("STUDY")
///     .resource_id("st-1029")
///     .outcome(Outcome::Success)
///     .build();
/// assert_eq!(record.actor.as_deref(), Some("alice"));
/// ```
#[derive(Debug, Clone, bon::Builder)]
pub struct AuditRecord {
    /// What happened.
    #[builder(into)]
    pub action: AuditAction,
    /// Who did it, when known.
    #[builder(into)]
    pub actor: Option<String>,
    /// Kind of resource affected.
    #[builder(into)]
    pub resource_type: String,
    /// Identifier of the resource affected.
    #[builder(into)]
    pub resource_id: String,
    /// Whether it succeeded.
    #[builder(default)]
    pub outcome: Outcome,
    /// Free-form context; redacted before it is hashed.
    #[builder(default)]
    pub details: Map<String, Value>,
}

impl AuditRecord {
    fn validate(&self) -> AuditResult<()> {
        if self.action.as_str().trim().is_empty() {
            return Err(AuditError::invalid_record("action must not be empty"));
        }
        if self.resource_type.trim().is_empty() {
            return Err(AuditError::invalid_record("resource_type must not be empty"));
        }
        if self.resource_id.trim().is_empty() {
            return Err(AuditError::invalid_record("resource_id must not be empty"));
        }
        Ok(())
    }
}

/// Filter for [`AuditTrail::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default, bon::Builder)]
pub struct AuditQuery {
    /// Exact resource type.
    #[builder(into)]
    pub resource_type: Option<String>,
    /// Exact resource identifier.
    #[builder(into)]
    pub resource_id: Option<String>,
    /// Exact actor.
    #[builder(into)]
    pub actor: Option<String>,
    /// Exact action.
    #[builder(into)]
    pub action: Option<AuditAction>,
}

impl AuditQuery {
    /// Returns `true` if `entry` satisfies every set field.
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.resource_type.as_ref().is_none_or(|v| *v == entry.resource_type)
            && self.resource_id.as_ref().is_none_or(|v| *v == entry.resource_id)
            && self.actor.as_ref().is_none_or(|v| entry.actor.as_ref() == Some(v))
            && self.action.as_ref().is_none_or(|v| *v == entry.action)
    }
}

#[derive(Debug)]
struct TrailState {
    entries: Vec<AuditEntry>,
    tail_hash: String,
    last_timestamp: Option<DateTime<Utc>>,
}

impl TrailState {
    fn from_entries(entries: Vec<AuditEntry>) -> Self {
        let tail_hash =
            entries.last().map_or_else(|| GENESIS_HASH.to_owned(), |e| e.entry_hash.clone());
        let last_timestamp = entries.last().map(|e| e.timestamp);
        Self { entries, tail_hash, last_timestamp }
    }
}

/// Append-only, tamper-evident log of security-relevant actions.
///
/// One instance owns its chain. Share it behind an [`Arc`] rather than
/// opening the same sink twice.
#[derive(Debug)]
pub struct AuditTrail {
    append_lock: Arc<tokio::sync::Mutex<()>>,
    state: Arc<RwLock<TrailState>>,
    sink: Arc<dyn AuditSink>,
    redactor: PhiRedactor,
    clock: Arc<dyn Clock>,
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditTrail {
    /// Creates an empty trail backed by a [`MemorySink`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_state(Arc::new(MemorySink::new()), TrailState::from_entries(Vec::new()))
    }

    /// Opens a trail over `sink`, resuming the chain from whatever it
    /// already holds.
    ///
    /// A chain that fails verification is still loaded so that it can be
    /// inspected; [`verify_integrity`](Self::verify_integrity) reports it.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink cannot be read.
    pub async fn open(sink: Arc<dyn AuditSink>) -> AuditResult<Self> {
        let entries = sink.load().await?;
        if let Err(e) = verify_entries(&entries) {
            tracing::error!(error = %e, "loaded audit chain failed verification");
        }
        tracing::debug!(entries = entries.len(), "audit trail opened");
        Ok(Self::with_state(sink, TrailState::from_entries(entries)))
    }

    fn with_state(sink: Arc<dyn AuditSink>, state: TrailState) -> Self {
        Self {
            append_lock: Arc::new(tokio::sync::Mutex::new(())),
            state: Arc::new(RwLock::new(state)),
            sink,
            redactor: PhiRedactor::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Uses `clock` for entry timestamps.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Uses `redactor` to scrub entry details.
    #[must_use]
    pub fn with_redactor(mut self, redactor: PhiRedactor) -> Self {
        self.redactor = redactor;
        self
    }

    /// Appends a record to the chain and returns the sealed entry.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidRecord`] for an empty action, resource
    /// type or resource id, and any sink error. A failed append leaves the
    /// chain unchanged. Once the entry is sealed it is persisted and
    /// committed even if the returned future is dropped.
    #[tracing::instrument(skip(self, record), fields(action = %record.action))]
    pub async fn append(&self, record: AuditRecord) -> AuditResult<AuditEntry> {
        record.validate()?;
        let (details, redacted) = self.redactor.redact_map(&record.details);

        let guard = Arc::clone(&self.append_lock).lock_owned().await;
        let (previous_hash, last_timestamp) = {
            let state = self.state.read();
            (state.tail_hash.clone(), state.last_timestamp)
        };

        let now = self.clock.now().trunc_subsecs(6);
        let timestamp = last_timestamp.map_or(now, |last| now.max(last));

        let entry = AuditEntry {
            schema_version: AUDIT_SCHEMA_VERSION,
            entry_id: Uuid::new_v4(),
            timestamp,
            action: record.action,
            actor: record.actor,
            resource_type: record.resource_type,
            resource_id: record.resource_id,
            outcome: record.outcome,
            details,
            previous_hash,
            entry_hash: String::new(),
        }
        .seal()?;

        let sink = Arc::clone(&self.sink);
        let state = Arc::clone(&self.state);
        let commit = tokio::spawn(
            async move {
                let _guard = guard;
                sink.persist(&entry).await?;
                {
                    let mut state = state.write();
                    state.tail_hash.clone_from(&entry.entry_hash);
                    state.last_timestamp = Some(entry.timestamp);
                    state.entries.push(entry.clone());
                }
                tracing::event!(
                    target: "audit",
                    tracing::Level::INFO,
                    audit.entry_id = %entry.entry_id,
                    audit.timestamp = %entry.timestamp.to_rfc3339(),
                    audit.action = %entry.action,
                    audit.actor = entry.actor.as_deref().unwrap_or("-"),
                    audit.resource_type = %entry.resource_type,
                    audit.resource_id = %entry.resource_id,
                    audit.outcome = %entry.outcome,
                    audit.redacted = redacted,
                    "audit_event"
                );
                Ok::<_, AuditError>(entry)
            }
            .in_current_span(),
        );
        commit.await.map_err(|e| AuditError::sink("audit append task did not complete", e))?
    }

    /// Recomputes the chain from genesis.
    ///
    /// Returns the number of verified entries.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::ChainCorrupted`] naming the first bad entry.
    pub fn verify_chain(&self) -> AuditResult<usize> {
        let state = self.state.read();
        let tail = verify_entries(&state.entries)?;
        if tail != state.tail_hash {
            if let Some(last) = state.entries.last() {
                return Err(AuditError::ChainCorrupted {
                    entry_id: last.entry_id,
                    position: state.entries.len() - 1,
                });
            }
        }
        Ok(state.entries.len())
    }

    /// Returns `true` if every entry links to its predecessor and hashes to
    /// its stored value. An empty trail is valid.
    ///
    /// The first offending entry is logged at `ERROR`.
    pub fn verify_integrity(&self) -> bool {
        match self.verify_chain() {
            Ok(_) => true,
            Err(e) => {
                if let AuditError::ChainCorrupted { entry_id, position } = &e {
                    tracing::error!(%entry_id, position, "audit chain integrity check failed");
                } else {
                    tracing::error!(error = %e, "audit chain integrity check failed");
                }
                false
            },
        }
    }

    /// Reloads the sink and verifies what is actually stored there.
    ///
    /// # Errors
    ///
    /// Returns any sink error, or [`AuditError::ChainCorrupted`].
    pub async fn verify_persisted(&self) -> AuditResult<usize> {
        let entries = self.sink.load().await?;
        verify_entries(&entries)?;
        Ok(entries.len())
    }

    /// Returns the entries matching `filter`, in chain order.
    #[must_use]
    pub fn query(&self, filter: &AuditQuery) -> Vec<AuditEntry> {
        self.state.read().entries.iter().filter(|e| filter.matches(e)).cloned().collect()
    }

    /// Returns up to `n` entries, newest first.
    #[must_use]
    pub fn latest(&self, n: usize) -> Vec<AuditEntry> {
        self.state.read().entries.iter().rev().take(n).cloned().collect()
    }

    /// Number of entries in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Returns `true` if nothing has been appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hash of the last entry, or [`GENESIS_HASH`].
    #[must_use]
    pub fn tail_hash(&self) -> String {
        self.state.read().tail_hash.clone()
    }

    /// Serializes the whole chain as a pretty-printed JSON array.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Serialization`] if encoding fails.
    pub fn export_json(&self) -> AuditResult<String> {
        Ok(serde_json::to_string_pretty(&self.state.read().entries)?)
    }
}
