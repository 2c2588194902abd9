//! # MedAI Guard Audit
//!
//! Tamper-evident audit logging for the MedAI security gateway.
//!
//! Every security-relevant action becomes an [`AuditEntry`] whose hash covers
//! its own fields and the hash of the entry before it. Editing, removing or
//! reordering any stored entry breaks the chain at that position, which
//! [`AuditTrail::verify_integrity`] detects by recomputing from genesis.
//!
//! Free-form details pass through the [`PhiRedactor`] before they are hashed,
//! so protected health information never reaches the chain.
//!
//! ## Example
//!
//! ```
//! use medai_guard_audit::{AuditAction, AuditRecord, AuditTrail, Outcome};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let trail = AuditTrail::new();
//! let entry = trail
//!     .append(
//!         AuditRecord::builder()
//!             .action(AuditAction::Login)
//!             .actor("alice")
//!             .resource_type("USER")
//!             .resource_id("alice")
//!             .outcome(Outcome::Success)
//!             .build(),
//!     )
//!     .await
//!     .unwrap();
//!
//! assert_eq!(trail.tail_hash(), entry.entry_hash);
//! assert!(trail.verify_integrity());
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Entries, canonical serialization and chain verification.
pub mod entry;
/// Audit error types.
pub mod error;
/// PHI detection and masking.
pub mod redact;
/// Entry persistence.
pub mod sink;
/// The append-only trail.
pub mod trail;

pub use entry::{
    AUDIT_SCHEMA_VERSION, AuditAction, AuditEntry, GENESIS_HASH, Outcome, verify_entries,
};
pub use error::{AuditError, AuditResult};
pub use redact::{PhiKind, PhiRedactor};
pub use sink::{AuditSink, JsonlFileSink, MemorySink};
pub use trail::{AuditQuery, AuditRecord, AuditTrail};
