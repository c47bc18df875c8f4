//! Target enumeration from a date range
//!
//! Archives are published once per day, so the set of candidate transfers is
//! fully determined by a date range. Enumeration is pure: the same range and
//! configuration always produce the same task sequence, which keeps the
//! ledger merge idempotent across runs.

use std::path::PathBuf;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::app::models::TransferTask;
use crate::constants::{files, origin};
use crate::errors::{EnumerationError, EnumerationResult, TransferResult};

/// Inclusive range of archive dates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    /// Create a range, rejecting `start > end`
    pub fn new(start: NaiveDate, end: NaiveDate) -> EnumerationResult<Self> {
        if start > end {
            return Err(EnumerationError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Range from `start` through the current UTC date
    pub fn through_today(start: NaiveDate) -> EnumerationResult<Self> {
        Self::new(start, Utc::now().date_naive())
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of calendar days covered
    pub fn days(&self) -> usize {
        (self.end - self.start).num_days() as usize + 1
    }

    /// Iterate every day in the range, oldest first
    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }
}

/// Parse a `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> EnumerationResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), origin::DATE_FORMAT).map_err(|e| {
        EnumerationError::InvalidDate {
            value: value.to_string(),
            reason: e.to_string(),
        }
    })
}

/// Order in which tasks are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskOrder {
    /// Ascending by date, the order the origin lists archives in
    #[default]
    OldestFirst,
    /// Descending by date
    NewestFirst,
}

/// Configuration for target enumeration
#[derive(Debug, Clone)]
pub struct EnumeratorConfig {
    /// Origin directory the archive names are resolved against
    pub base_url: Url,
    /// Local directory the archives are written to
    pub download_dir: PathBuf,
    /// Production order
    pub order: TaskOrder,
    /// Optional cap on the number of tasks
    pub max_count: Option<usize>,
}

impl Default for EnumeratorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            download_dir: PathBuf::from(files::DEFAULT_DOWNLOAD_DIR),
            order: TaskOrder::default(),
            max_count: None,
        }
    }
}

/// Parsed default origin URL
pub fn default_base_url() -> Url {
    // Compile-time constant, covered by tests
    Url::parse(origin::BASE_URL).expect("default origin URL is valid")
}

/// Produce the ordered task list for a range
///
/// One task per calendar day in `range`, ordered per `config.order` and
/// truncated to `config.max_count` when set.
pub fn enumerate_tasks(
    range: &DateRange,
    config: &EnumeratorConfig,
) -> TransferResult<Vec<TransferTask>> {
    let mut dates: Vec<NaiveDate> = range.iter().collect();
    if config.order == TaskOrder::NewestFirst {
        dates.reverse();
    }
    if let Some(max) = config.max_count {
        dates.truncate(max);
    }

    dates
        .into_iter()
        .map(|date| TransferTask::for_date(date, &config.base_url, &config.download_dir))
        .collect()
}
