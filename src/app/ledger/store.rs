//! Ledger storage and atomic persistence

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::config::LedgerConfig;
use crate::app::models::{TransferState, TransferStatus, TransferTask};
use crate::constants::{files, ledger};
use crate::errors::{LedgerError, LedgerResult};

/// On-disk ledger document
#[derive(Debug, Deserialize)]
struct LedgerDocument {
    schema_version: u32,
    tasks: BTreeMap<String, TransferState>,
}

/// Borrowed view used for serialization, avoids cloning the map on every flush
#[derive(Serialize)]
struct LedgerDocumentRef<'a> {
    schema_version: u32,
    updated_at: DateTime<Utc>,
    tasks: &'a BTreeMap<String, TransferState>,
}

/// Per-status tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
}

impl LedgerCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed
    }
}

/// Durable mapping from task id to transfer state
#[derive(Debug)]
pub struct Ledger {
    config: LedgerConfig,
    tasks: BTreeMap<String, TransferState>,
    /// Download progress recorded since the last flush
    unflushed_bytes: u64,
    flush_count: u64,
}

impl Ledger {
    /// Empty ledger that will persist to `config.path`
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            tasks: BTreeMap::new(),
            unflushed_bytes: 0,
            flush_count: 0,
        }
    }

    /// Load the ledger from disk
    ///
    /// A missing file yields an empty ledger. A file that exists but does not
    /// parse yields [`LedgerError::Corrupt`]; the caller decides whether to
    /// abort or [`quarantine_corrupt`](Self::quarantine_corrupt) and start fresh.
    pub fn load(config: LedgerConfig) -> LedgerResult<Self> {
        let bytes = match fs::read(&config.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(
                    "No ledger at {}, starting empty",
                    config.path.display()
                );
                return Ok(Self::new(config));
            }
            Err(e) => return Err(LedgerError::Io(e)),
        };

        let document: LedgerDocument =
            serde_json::from_slice(&bytes).map_err(|e| LedgerError::Corrupt {
                path: config.path.clone(),
                reason: e.to_string(),
            })?;

        if document.schema_version > ledger::SCHEMA_VERSION {
            return Err(LedgerError::SchemaMismatch {
                expected: ledger::SCHEMA_VERSION,
                found: document.schema_version,
            });
        }

        info!(
            "Loaded ledger {} with {} entries",
            config.path.display(),
            document.tasks.len()
        );

        Ok(Self {
            config,
            tasks: document.tasks,
            unflushed_bytes: 0,
            flush_count: 0,
        })
    }

    /// Move a corrupt ledger aside so a fresh one can take its place
    ///
    /// Returns the quarantine path, or `None` if there was nothing to move.
    pub fn quarantine_corrupt(path: &Path) -> LedgerResult<Option<PathBuf>> {
        if !path.exists() {
            return Ok(None);
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| files::LEDGER_FILE_NAME.to_string());
        let quarantined = path.with_file_name(format!(
            "{}.{}-{}",
            file_name,
            files::CORRUPT_SUFFIX,
            Utc::now().format("%Y%m%dT%H%M%SZ")
        ));

        fs::rename(path, &quarantined)?;
        warn!(
            "Moved corrupt ledger {} to {}",
            path.display(),
            quarantined.display()
        );
        Ok(Some(quarantined))
    }

    /// Insert a pending state for every task id not already present
    ///
    /// Existing entries are never modified and ids absent from `tasks` are
    /// left alone. Returns the number of inserted entries.
    pub fn merge(&mut self, tasks: &[TransferTask]) -> LedgerResult<usize> {
        let mut inserted = 0;
        for task in tasks {
            if !self.tasks.contains_key(&task.id) {
                self.tasks.insert(task.id.clone(), TransferState::pending());
                inserted += 1;
            }
        }

        if inserted > 0 {
            debug!("Merged {} new tasks into ledger", inserted);
            self.flush()?;
        }
        Ok(inserted)
    }

    /// State of a task
    pub fn get(&self, id: &str) -> Option<&TransferState> {
        self.tasks.get(id)
    }

    /// Replace the state of a task
    ///
    /// Flushes when the status, retry count or known total changed, or when
    /// the download progress recorded since the last flush reaches the
    /// configured threshold. Returns whether a flush happened.
    pub fn set(&mut self, id: &str, state: TransferState) -> LedgerResult<bool> {
        let significant = match self.tasks.get(id) {
            Some(previous) => {
                self.unflushed_bytes += state
                    .bytes_downloaded
                    .saturating_sub(previous.bytes_downloaded);
                previous.status != state.status
                    || previous.retry_count != state.retry_count
                    || previous.total_bytes != state.total_bytes
            }
            None => {
                self.unflushed_bytes += state.bytes_downloaded;
                true
            }
        };

        self.tasks.insert(id.to_string(), state);

        if significant || self.unflushed_bytes >= self.config.flush_threshold_bytes {
            self.flush()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Atomically persist the full mapping
    ///
    /// Writes a sibling temp file, syncs it, renames it over the ledger and
    /// syncs the directory. The previous ledger stays intact until the rename.
    ///
    /// This is blocking `std::fs` I/O and runs on whatever task calls it,
    /// including the async transfer loop. The engine is serial, so nothing
    /// else is scheduled on that worker while a flush is in progress; callers
    /// that share a runtime with other work should wrap ledger updates in
    /// `tokio::task::spawn_blocking`.
    pub fn flush(&mut self) -> LedgerResult<()> {
        let path = &self.config.path;
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent)?;

        let document = LedgerDocumentRef {
            schema_version: ledger::SCHEMA_VERSION,
            updated_at: Utc::now(),
            tasks: &self.tasks,
        };
        let json = serde_json::to_vec_pretty(&document)?;

        let prefix = format!(
            ".{}.",
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| files::LEDGER_FILE_NAME.to_string())
        );
        let mut temp_file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".tmp")
            .tempfile_in(&parent)?;

        temp_file.write_all(&json)?;
        temp_file.flush()?;
        temp_file.as_file().sync_all()?;

        temp_file.persist(path).map_err(|e| LedgerError::Persist {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        // Make the rename itself durable
        #[cfg(unix)]
        if let Ok(dir) = fs::File::open(&parent) {
            let _ = dir.sync_all();
        }

        self.unflushed_bytes = 0;
        self.flush_count += 1;
        debug!(
            "Flushed ledger {} ({} entries)",
            path.display(),
            self.tasks.len()
        );
        Ok(())
    }

    /// Tally entries by status
    pub fn counts(&self) -> LedgerCounts {
        let mut counts = LedgerCounts::default();
        for state in self.tasks.values() {
            match state.status {
                TransferStatus::Pending => counts.pending += 1,
                TransferStatus::InProgress => counts.in_progress += 1,
                TransferStatus::Completed => counts.completed += 1,
                TransferStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// Entries whose retry budget is exhausted
    pub fn failed(&self) -> impl Iterator<Item = (&String, &TransferState)> {
        self.tasks.iter().filter(|(_, state)| state.is_failed())
    }

    /// All entries in id order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &TransferState)> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Path of the ledger file
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Number of flushes performed by this instance
    pub fn flush_count(&self) -> u64 {
        self.flush_count
    }
}
