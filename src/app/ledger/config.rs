//! Ledger configuration

use std::path::{Path, PathBuf};

use crate::constants::{files, ledger};

/// Where the ledger lives and how often in-flight progress is persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Path of the ledger file
    pub path: PathBuf,
    /// Bytes of download progress accumulated before a forced flush
    pub flush_threshold_bytes: u64,
}

impl LedgerConfig {
    /// Ledger at `path` with the default flush threshold
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            flush_threshold_bytes: ledger::DEFAULT_FLUSH_THRESHOLD_BYTES,
        }
    }

    /// Ledger at its conventional location inside a download directory
    pub fn in_download_dir(download_dir: &Path) -> Self {
        Self::new(download_dir.join(files::LEDGER_FILE_NAME))
    }

    /// Override the flush threshold
    pub fn with_flush_threshold(mut self, bytes: u64) -> Self {
        self.flush_threshold_bytes = bytes;
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::in_download_dir(Path::new(files::DEFAULT_DOWNLOAD_DIR))
    }
}
