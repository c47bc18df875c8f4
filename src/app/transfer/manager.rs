//! Transfer manager core loop

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Instant;

use futures::StreamExt;
use indicatif::ProgressBar;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::config::TransferConfig;
use super::stats::RunSummary;
use crate::app::client::{FetchKind, FetchResponse, PacedClient};
use crate::app::extract::Extractor;
use crate::app::ledger::Ledger;
use crate::app::models::{TransferState, TransferStatus, TransferTask};
use crate::errors::{TransferError, TransferResult};

/// What a run does with a task before touching the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Plan {
    Transfer,
    AlreadyComplete,
    SkipFailed,
}

/// Owns the ledger, the transport and the optional extraction stage for one run
#[derive(Debug)]
pub struct TransferManager {
    config: TransferConfig,
    ledger: Ledger,
    client: PacedClient,
    extractor: Option<Extractor>,
    progress: Option<ProgressBar>,
    bytes_transferred: u64,
}

impl TransferManager {
    pub fn new(config: TransferConfig, ledger: Ledger, client: PacedClient) -> Self {
        Self {
            config,
            ledger,
            client,
            extractor: None,
            progress: None,
            bytes_transferred: 0,
        }
    }

    /// Extract each archive as soon as it completes
    pub fn with_extractor(mut self, extractor: Extractor) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Report byte progress of the current archive on `bar`
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = Some(bar);
        self
    }

    /// Process `tasks` in order until each is completed or failed
    ///
    /// Failed attempts with budget left go to the back of this run's queue.
    ///
    /// # Errors
    ///
    /// Only ledger failures abort the run; every other error is recorded
    /// against its task.
    pub async fn run(&mut self, tasks: Vec<TransferTask>) -> TransferResult<RunSummary> {
        let started = Instant::now();
        let mut summary = RunSummary::new(tasks.len());
        self.bytes_transferred = 0;

        fs::create_dir_all(&self.config.download_dir).await?;
        let inserted = self.ledger.merge(&tasks)?;
        info!(
            "Planned {} archives ({} new to the ledger)",
            tasks.len(),
            inserted
        );

        let mut queue = VecDeque::with_capacity(tasks.len());
        for task in tasks {
            match self.plan(&task).await? {
                Plan::Transfer => queue.push_back(task),
                Plan::AlreadyComplete => {
                    debug!("{} already complete, skipping", task.id);
                    summary.already_complete += 1;
                }
                Plan::SkipFailed => {
                    debug!("{} previously failed, skipping", task.id);
                    summary.skipped_failed += 1;
                }
            }
        }

        let pending = queue.len();
        let mut position = 0;
        while let Some(task) = queue.pop_front() {
            position += 1;
            info!(
                "Downloading {} ({}/{})",
                task.file_name(),
                position.min(pending),
                pending
            );

            match self.transfer(&task).await {
                Ok(()) => {
                    summary.completed += 1;
                    self.after_completion(&task, &mut summary).await;
                }
                Err(e) if e.is_fatal() => {
                    error!("Aborting run: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    let state = self.record_failure(&task, &e)?;
                    if state.is_failed() {
                        error!(
                            "{} failed permanently after {} attempts: {}",
                            task.id, state.retry_count, e
                        );
                        summary.failed += 1;
                    } else {
                        warn!(
                            "{} attempt {}/{} failed: {}. Requeued",
                            task.id, state.retry_count, self.config.max_retries, e
                        );
                        summary.retried += 1;
                        queue.push_back(task);
                    }
                }
            }
        }

        if let Some(bar) = &self.progress {
            bar.finish_and_clear();
        }
        self.ledger.flush()?;

        summary.bytes_transferred = self.bytes_transferred;
        summary.requests_sent = self.client.requests_sent();
        summary.duration = started.elapsed();
        Ok(summary)
    }

    /// Decide whether a task needs network work
    async fn plan(&mut self, task: &TransferTask) -> TransferResult<Plan> {
        let mut state = self.ledger.get(&task.id).cloned().unwrap_or_default();

        match state.status {
            TransferStatus::Completed => {
                let on_disk = file_size(&task.destination).await?;
                if on_disk.is_some() && on_disk == state.total_bytes {
                    return Ok(Plan::AlreadyComplete);
                }
                warn!(
                    "{} is marked completed but {} is {}; downloading again",
                    task.id,
                    task.destination.display(),
                    match on_disk {
                        Some(size) => format!("{} bytes", size),
                        None => "missing".to_string(),
                    }
                );
                state.reset_for_retry();
                self.ledger.set(&task.id, state)?;
                Ok(Plan::Transfer)
            }
            TransferStatus::Failed if self.config.force_retry => {
                info!("Retrying previously failed {}", task.id);
                state.reset_for_retry();
                self.ledger.set(&task.id, state)?;
                Ok(Plan::Transfer)
            }
            TransferStatus::Failed => Ok(Plan::SkipFailed),
            TransferStatus::Pending | TransferStatus::InProgress => Ok(Plan::Transfer),
        }
    }

    /// One attempt at retrieving a task
    ///
    /// The destination file is ground truth for how much has been retrieved.
    async fn transfer(&mut self, task: &TransferTask) -> TransferResult<()> {
        let mut state = self.ledger.get(&task.id).cloned().unwrap_or_default();
        let on_disk = file_size(&task.destination).await?;
        let mut offset = on_disk.unwrap_or(0);

        if let (Some(size), Some(total)) = (on_disk, state.total_bytes) {
            if size == total {
                info!("{} already on disk ({} bytes)", task.id, total);
                return self.complete(task, &mut state, total);
            }
            if size > total {
                warn!(
                    "{} is larger than the origin copy ({} > {} bytes); restarting",
                    task.destination.display(),
                    size,
                    total
                );
                discard(&task.destination).await?;
                offset = 0;
            }
        }

        if offset != state.bytes_downloaded {
            debug!(
                "{}: ledger says {} bytes, file has {}; trusting the file",
                task.id, state.bytes_downloaded, offset
            );
            state.bytes_downloaded = offset;
        }
        state.mark_in_progress();
        self.ledger.set(&task.id, state.clone())?;

        let mut restarted = false;
        loop {
            let response = self.client.fetch(&task.url, offset).await?;

            if let Some(total) = response.total_bytes() {
                if state.total_bytes != Some(total) {
                    state.total_bytes = Some(total);
                    self.ledger.set(&task.id, state.clone())?;
                }
            }

            let file = match response.kind() {
                FetchKind::RangeNotSatisfiable => {
                    if response.total_bytes() == Some(offset) {
                        return self.complete(task, &mut state, offset);
                    }
                    if restarted {
                        return Err(TransferError::SizeMismatch {
                            expected: response.total_bytes().unwrap_or(0),
                            actual: offset,
                        });
                    }
                    warn!(
                        "Origin rejected resume of {} at byte {} (total {:?}); restarting",
                        task.id,
                        offset,
                        response.total_bytes()
                    );
                    discard(&task.destination).await?;
                    offset = 0;
                    state.bytes_downloaded = 0;
                    restarted = true;
                    continue;
                }
                FetchKind::Full => {
                    if offset > 0 {
                        info!(
                            "Origin ignored range for {}; rewriting from byte 0",
                            task.id
                        );
                    }
                    offset = 0;
                    OpenOptions::new()
                        .create(true)
                        .write(true)
                        .truncate(true)
                        .open(&task.destination)
                        .await
                }
                FetchKind::Partial => {
                    if response.offset() != offset {
                        self.client.record_completion();
                        return Err(TransferError::UnexpectedRange {
                            requested: offset,
                            received: response.offset(),
                        });
                    }
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(&task.destination)
                        .await
                }
            };

            let file = match file {
                Ok(file) => file,
                Err(e) => {
                    self.client.record_completion();
                    return Err(e.into());
                }
            };

            let streamed = self.stream_body(task, response, file, offset, &mut state).await;
            self.client.record_completion();
            let final_size = streamed?;

            if let Some(expected) = state.total_bytes {
                if final_size != expected {
                    discard(&task.destination).await?;
                    state.bytes_downloaded = 0;
                    self.ledger.set(&task.id, state.clone())?;
                    return Err(TransferError::SizeMismatch {
                        expected,
                        actual: final_size,
                    });
                }
            }

            return self.complete(task, &mut state, final_size);
        }
    }

    /// Append the response body to `file`, returning the final file size
    async fn stream_body(
        &mut self,
        task: &TransferTask,
        response: FetchResponse,
        mut file: File,
        offset: u64,
        state: &mut TransferState,
    ) -> TransferResult<u64> {
        if let Some(bar) = &self.progress {
            bar.set_length(state.total_bytes.unwrap_or(0));
            bar.set_position(offset);
            bar.set_message(task.id.clone());
        }

        let mut written = offset;
        let streamed = self
            .copy_body(task, response, &mut file, &mut written, state)
            .await;

        // The next pass sizes the file to pick its resume offset, so pending
        // writes must land even when the body broke off.
        let flushed = file.flush().await;
        if let Err(e) = streamed {
            if let Err(flush_err) = flushed {
                warn!("Could not flush partial {}: {}", task.id, flush_err);
            }
            return Err(e);
        }
        flushed?;
        file.sync_all().await?;
        Ok(written)
    }

    /// Write body chunks to `file` until the stream ends, tracking `written`
    async fn copy_body(
        &mut self,
        task: &TransferTask,
        response: FetchResponse,
        file: &mut File,
        written: &mut u64,
        state: &mut TransferState,
    ) -> TransferResult<()> {
        let stream = response.bytes_stream();
        tokio::pin!(stream);

        let stall = self.config.stall_timeout;
        loop {
            let next = timeout(stall, stream.next())
                .await
                .map_err(|_| TransferError::Stalled {
                    seconds: stall.as_secs(),
                })?;
            let Some(chunk) = next else {
                return Ok(());
            };
            let chunk = chunk?;
            let chunk = chunk.as_ref();

            file.write_all(chunk).await?;
            *written += chunk.len() as u64;
            self.bytes_transferred += chunk.len() as u64;

            state.bytes_downloaded = *written;
            self.ledger.set(&task.id, state.clone())?;

            if let Some(bar) = &self.progress {
                bar.set_position(*written);
            }
        }
    }

    fn complete(
        &mut self,
        task: &TransferTask,
        state: &mut TransferState,
        total: u64,
    ) -> TransferResult<()> {
        state.mark_completed(total);
        self.ledger.set(&task.id, state.clone())?;
        info!("Completed {} ({} bytes)", task.file_name(), total);
        Ok(())
    }

    /// Charge a failed attempt against the task's retry budget
    fn record_failure(
        &mut self,
        task: &TransferTask,
        err: &TransferError,
    ) -> TransferResult<TransferState> {
        let mut state = self.ledger.get(&task.id).cloned().unwrap_or_default();
        if err.is_permanent() {
            state.record_permanent_failure(err.to_string(), self.config.max_retries);
        } else {
            state.record_failure(err.to_string(), self.config.max_retries);
        }
        self.ledger.set(&task.id, state.clone())?;
        Ok(state)
    }

    async fn after_completion(&self, task: &TransferTask, summary: &mut RunSummary) {
        let Some(extractor) = &self.extractor else {
            return;
        };
        match extractor.extract(task).await {
            Ok(_) => summary.extracted += 1,
            Err(e) => {
                warn!("Extraction of {} failed: {}", task.id, e);
                summary.extraction_failures += 1;
            }
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn client(&self) -> &PacedClient {
        &self.client
    }

    /// Give back the ledger once the run is over
    pub fn into_ledger(self) -> Ledger {
        self.ledger
    }
}

/// Size of `path`, `None` when it does not exist
async fn file_size(path: &Path) -> TransferResult<Option<u64>> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove a partial file that cannot be resumed
async fn discard(path: &Path) -> TransferResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
