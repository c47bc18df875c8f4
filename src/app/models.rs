//! Data models for KataGo Fetcher
//!
//! This module defines the transfer targets enumerated for a run and the
//! per-target state persisted in the status ledger.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::origin;
use crate::errors::{TransferError, TransferResult};

/// One remote archive to retrieve
///
/// Cheap to recompute from a date, so it is never persisted; only its
/// [`TransferState`] is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTask {
    /// Stable identifier, the `YYYY-MM-DD` stamp of the archive name
    pub id: String,
    /// Date the archive covers
    pub date: NaiveDate,
    /// Resolved source URL
    pub url: Url,
    /// Final path of the archive on disk
    pub destination: PathBuf,
}

impl TransferTask {
    /// Build the task for a date under the given origin and download directory
    pub fn for_date(date: NaiveDate, base_url: &Url, download_dir: &Path) -> TransferResult<Self> {
        let file_name = archive_file_name(date);
        let url = base_url
            .join(&file_name)
            .map_err(|e| TransferError::InvalidUrl {
                url: format!("{}{}", base_url, file_name),
                error: e.to_string(),
            })?;

        Ok(Self {
            id: task_id(date),
            date,
            url,
            destination: download_dir.join(file_name),
        })
    }

    /// Archive file name, e.g. `2021-01-01sgfs.tar.bz2`
    pub fn file_name(&self) -> String {
        archive_file_name(self.date)
    }
}

/// Task id for a date
pub fn task_id(date: NaiveDate) -> String {
    date.format(origin::DATE_FORMAT).to_string()
}

/// Archive file name for a date
pub fn archive_file_name(date: NaiveDate) -> String {
    format!("{}{}", task_id(date), origin::ARCHIVE_SUFFIX)
}

/// Recover the date from an archive file name such as `2021-01-01sgfs.tar.bz2`
pub fn parse_archive_file_name(name: &str) -> Option<NaiveDate> {
    let stamp = name.strip_suffix(origin::ARCHIVE_SUFFIX)?;
    NaiveDate::parse_from_str(stamp, origin::DATE_FORMAT).ok()
}

/// Transfer status of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    /// Never attempted
    Pending,
    /// Attempted at least once, partial data may exist on disk
    InProgress,
    /// Fully retrieved and verified
    Completed,
    /// Retry budget exhausted
    Failed,
}

impl TransferStatus {
    /// Lowercase label for display
    pub fn label(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::InProgress => "in_progress",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Persisted progress record for one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferState {
    pub status: TransferStatus,
    pub bytes_downloaded: u64,
    /// Unknown until the origin reports a content length
    pub total_bytes: Option<u64>,
    pub retry_count: u32,
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for TransferState {
    fn default() -> Self {
        Self::pending()
    }
}

impl TransferState {
    /// Fresh state for a newly enumerated task
    pub fn pending() -> Self {
        Self {
            status: TransferStatus::Pending,
            bytes_downloaded: 0,
            total_bytes: None,
            retry_count: 0,
            last_error: None,
            updated_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransferStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == TransferStatus::Failed
    }

    /// Mark the task as being worked on
    pub fn mark_in_progress(&mut self) {
        self.status = TransferStatus::InProgress;
        self.touch();
    }

    /// Mark the task as fully retrieved with `total` bytes on disk
    pub fn mark_completed(&mut self, total: u64) {
        self.status = TransferStatus::Completed;
        self.bytes_downloaded = total;
        self.total_bytes = Some(total);
        self.last_error = None;
        self.touch();
    }

    /// Record a failed attempt
    ///
    /// Stays `InProgress` while retries remain, becomes `Failed` once
    /// `retry_count` reaches `max_retries`.
    pub fn record_failure(&mut self, error: String, max_retries: u32) {
        self.retry_count = (self.retry_count + 1).min(max_retries);
        self.last_error = Some(error);
        self.status = if self.retry_count >= max_retries {
            TransferStatus::Failed
        } else {
            TransferStatus::InProgress
        };
        self.touch();
    }

    /// Record a failure that no retry can fix
    pub fn record_permanent_failure(&mut self, error: String, max_retries: u32) {
        self.retry_count = max_retries;
        self.last_error = Some(error);
        self.status = TransferStatus::Failed;
        self.touch();
    }

    /// Put a failed task back in line with a fresh retry budget
    pub fn reset_for_retry(&mut self) {
        self.status = TransferStatus::Pending;
        self.retry_count = 0;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}
