//! Persistence backends for audit entries.
//!
//! The [`AuditSink`] trait enables different persistence backends:
//!
//! - [`MemorySink`]: keeps entries in process memory, for tests and
//!   single-node development.
//! - [`JsonlFileSink`]: appends one JSON object per line to a file and
//!   reloads it on startup.
//!
//! Sinks only store and return entries. Hashing, ordering and verification
//! belong to [`AuditTrail`](crate::AuditTrail).

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};

use crate::{
    entry::AuditEntry,
    error::{AuditError, AuditResult},
};

/// Append-only storage for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync + fmt::Debug {
    /// Durably records one entry after every entry already persisted.
    async fn persist(&self, entry: &AuditEntry) -> AuditResult<()>;

    /// Returns every persisted entry in append order.
    async fn load(&self) -> AuditResult<Vec<AuditEntry>>;
}

/// In-process sink.
///
/// Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink pre-populated with `entries`, as if they had been
    /// persisted earlier.
    #[must_use]
    pub fn with_entries(entries: Vec<AuditEntry>) -> Self {
        Self { entries: Arc::new(Mutex::new(entries)) }
    }

    /// Returns a copy of everything persisted so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn persist(&self, entry: &AuditEntry) -> AuditResult<()> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }

    async fn load(&self) -> AuditResult<Vec<AuditEntry>> {
        Ok(self.snapshot())
    }
}

/// Newline-delimited JSON file sink.
///
/// A write that fails partway is truncated back to the previous end of file.
/// On [`load`](AuditSink::load), an unterminated final line that does not
/// parse is treated as a write torn by a crash: it is logged and cut off.
/// Unparsable lines anywhere else are an error.
#[derive(Debug)]
pub struct JsonlFileSink {
    path: PathBuf,
    file: tokio::sync::Mutex<File>,
}

impl JsonlFileSink {
    /// Opens `path` for appending, creating it and its parent directories
    /// when missing.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Sink`] if the file cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                AuditError::sink(format!("failed to create {}", parent.display()), e)
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AuditError::sink(format!("failed to open {}", path.display()), e))?;
        Ok(Self { path, file: tokio::sync::Mutex::new(file) })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn write_line(file: &mut File, line: &[u8]) -> std::io::Result<()> {
    file.write_all(line).await?;
    file.flush().await
}

#[async_trait]
impl AuditSink for JsonlFileSink {
    async fn persist(&self, entry: &AuditEntry) -> AuditResult<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        let len = file.metadata().await?.len();
        if let Err(e) = write_line(&mut file, &line).await {
            if let Err(rollback) = file.set_len(len).await {
                tracing::error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "failed to truncate partial audit write"
                );
            }
            return Err(AuditError::sink(
                format!("failed to append to {}", self.path.display()),
                e,
            ));
        }
        Ok(())
    }

    async fn load(&self) -> AuditResult<Vec<AuditEntry>> {
        let mut file = self.file.lock().await;
        let raw = fs::read(&self.path).await?;
        let mut entries = Vec::new();
        let mut offset = 0u64;
        let mut unterminated = false;

        for (idx, line) in raw.split_inclusive(|b| *b == b'\n').enumerate() {
            let start = offset;
            offset += line.len() as u64;
            unterminated = !line.ends_with(b"\n");
            let text = line.trim_ascii();
            if text.is_empty() {
                continue;
            }
            match serde_json::from_slice::<AuditEntry>(text) {
                Ok(entry) => entries.push(entry),
                Err(e) if unterminated => {
                    tracing::warn!(
                        path = %self.path.display(),
                        line = idx + 1,
                        bytes = line.len(),
                        error = %e,
                        "discarding torn audit record at end of file"
                    );
                    file.set_len(start).await?;
                    return Ok(entries);
                },
                Err(e) => {
                    return Err(AuditError::serialization(
                        format!("{} line {}: {e}", self.path.display(), idx + 1),
                        e,
                    ));
                },
            }
        }

        if unterminated {
            write_line(&mut file, b"\n").await?;
        }
        Ok(entries)
    }
}
