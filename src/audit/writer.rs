//! Append-only NDJSON audit writer.
//!
//! Every append is a full open → write → flush → close cycle; no file handle
//! outlives a call. Appends are serialized through an async mutex so lines
//! from concurrent requests never interleave. Failures are logged and
//! swallowed: audit durability is best-effort and never gates a response.

use std::path::{Path, PathBuf};

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, error};

use super::record::AuditRecord;
use crate::Result;

/// Shared writer for the audit log.
#[derive(Debug)]
pub struct AuditWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditWriter {
    /// Create a writer for `path`. Nothing touches the filesystem until the
    /// first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Log file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record`, logging (not returning) any failure.
    pub async fn append(&self, record: AuditRecord) {
        if let Err(e) = self.try_append(&record).await {
            error!(
                path = %self.path.display(),
                caller = %record.caller_id,
                allowed = record.allowed,
                error = %e,
                "Audit append failed"
            );
        }
    }

    /// Append `record` as one JSON line.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be serialized or the log
    /// cannot be created, opened or written.
    pub async fn try_append(&self, record: &AuditRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        drop(file);

        debug!(path = %self.path.display(), bytes = line.len(), "Audit record appended");
        Ok(())
    }
}
