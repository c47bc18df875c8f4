//! Run statistics and the closing report

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Outcome of one transfer run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Tasks handed to the run
    pub planned: usize,
    /// Archives retrieved during this run
    pub completed: usize,
    /// Archives that were already complete before the run
    pub already_complete: usize,
    /// Previously failed archives left alone
    pub skipped_failed: usize,
    /// Archives that exhausted their retry budget during this run
    pub failed: usize,
    /// Failed attempts that were requeued
    pub retried: usize,
    /// Body bytes written to disk
    pub bytes_transferred: u64,
    /// Archives extracted after completion
    pub extracted: usize,
    /// Extraction failures (transfer status unaffected)
    pub extraction_failures: usize,
    /// Requests put on the wire, retries included
    pub requests_sent: u64,
    /// Wall-clock duration of the run
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

impl RunSummary {
    pub fn new(planned: usize) -> Self {
        Self {
            planned,
            ..Default::default()
        }
    }

    /// Archives on disk and verified once the run finished
    pub fn total_complete(&self) -> usize {
        self.completed + self.already_complete
    }

    /// Bytes transferred in GB
    pub fn gigabytes(&self) -> f64 {
        self.bytes_transferred as f64 / BYTES_PER_GB
    }

    /// Average throughput over the run in bytes per second
    pub fn average_rate_bps(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_transferred as f64 / secs
        } else {
            0.0
        }
    }

    /// Whether every planned archive ended up complete
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.skipped_failed == 0
    }

    /// Log the closing report
    pub fn log(&self) {
        info!("Download run finished in {:.1}s", self.duration.as_secs_f64());
        info!(
            "  Completed: {} new, {} already present ({} of {} planned)",
            self.completed,
            self.already_complete,
            self.total_complete(),
            self.planned
        );
        info!(
            "  Transferred: {:.2} GB in {} requests",
            self.gigabytes(),
            self.requests_sent
        );
        if self.retried > 0 {
            info!("  Retried attempts: {}", self.retried);
        }
        if self.extracted > 0 || self.extraction_failures > 0 {
            info!(
                "  Extracted: {} ({} failed)",
                self.extracted, self.extraction_failures
            );
        }
        if self.failed > 0 || self.skipped_failed > 0 {
            warn!(
                "  Failed: {} this run, {} skipped from earlier runs (use --force-retry)",
                self.failed, self.skipped_failed
            );
        }
    }
}
