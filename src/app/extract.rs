//! Archive extraction stage
//!
//! Completed archives are unpacked by the external `tar` program into
//! `<download dir>/extracted/<date>/`. Extraction is a side stage: its
//! failures are reported and counted but never change a transfer's status.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::app::ledger::Ledger;
use crate::app::models::TransferTask;
use crate::constants::{extract, files, origin};
use crate::errors::{ExtractionError, ExtractionResult};

/// Configuration for the extraction stage
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Directory that receives one subdirectory per archive
    pub output_dir: PathBuf,
    /// Decompression program
    ///
    /// Must be GNU tar: `--skip-old-files` and `--wildcards` are not
    /// understood by bsdtar, the macOS default. Install `gnu-tar` and set
    /// this to `gtar` there.
    pub tar_program: String,
    /// Only extract members matching this glob; `None` extracts everything
    pub member_pattern: Option<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self::in_download_dir(Path::new(files::DEFAULT_DOWNLOAD_DIR))
    }
}

impl ExtractConfig {
    /// Standard layout under a download directory
    pub fn in_download_dir(download_dir: &Path) -> Self {
        Self {
            output_dir: download_dir.join(files::EXTRACT_DIR_NAME),
            tar_program: extract::TAR_PROGRAM.to_string(),
            member_pattern: Some(extract::MEMBER_PATTERN.to_string()),
        }
    }
}

/// Outcome of a batch extraction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    pub extracted: usize,
    pub failed: usize,
}

/// Runs the external decompression step
#[derive(Debug, Clone)]
pub struct Extractor {
    config: ExtractConfig,
}

impl Extractor {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config }
    }

    /// Output directory for one archive
    pub fn output_dir(&self, id: &str) -> PathBuf {
        self.config.output_dir.join(id)
    }

    /// Extract a completed task's archive
    pub async fn extract(&self, task: &TransferTask) -> ExtractionResult<PathBuf> {
        self.extract_archive(&task.destination, &task.id).await
    }

    /// Extract `archive` into the output directory for `id`
    ///
    /// Existing files are kept, so running it twice is harmless.
    pub async fn extract_archive(&self, archive: &Path, id: &str) -> ExtractionResult<PathBuf> {
        if !archive.is_file() {
            return Err(ExtractionError::ArchiveMissing {
                path: archive.to_path_buf(),
            });
        }

        let output_dir = self.output_dir(id);
        tokio::fs::create_dir_all(&output_dir).await?;

        let mut cmd = Command::new(&self.config.tar_program);
        cmd.arg("--extract")
            .arg("--bzip2")
            .arg("--skip-old-files")
            .arg("--file")
            .arg(archive)
            .arg("--directory")
            .arg(&output_dir);
        if let Some(pattern) = &self.config.member_pattern {
            cmd.arg("--wildcards").arg(pattern);
        }

        debug!("Running {:?}", cmd);
        let output = cmd.output().await.map_err(|e| ExtractionError::Spawn {
            program: self.config.tar_program.clone(),
            source: e,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if self.config.member_pattern.is_some() && only_unmatched_members(&stderr) {
                info!(
                    "{} holds no members matching {}; nothing extracted",
                    archive.display(),
                    self.config.member_pattern.as_deref().unwrap_or_default()
                );
                return Ok(output_dir);
            }
            return Err(ExtractionError::Failed {
                path: archive.to_path_buf(),
                code: output.status.code(),
                stderr: with_gnu_tar_hint(stderr, &self.config.tar_program),
            });
        }

        info!("Extracted {} to {}", archive.display(), output_dir.display());
        Ok(output_dir)
    }

    /// Extract every archive the ledger lists as completed
    pub async fn extract_completed(&self, ledger: &Ledger, download_dir: &Path) -> ExtractionReport {
        let mut report = ExtractionReport::default();

        for (id, state) in ledger.iter() {
            if !state.is_completed() {
                continue;
            }
            let archive = download_dir.join(format!("{}{}", id, origin::ARCHIVE_SUFFIX));
            match self.extract_archive(&archive, id).await {
                Ok(_) => report.extracted += 1,
                Err(e) => {
                    warn!("Extraction of {} failed: {}", id, e);
                    report.failed += 1;
                }
            }
        }

        report
    }

    pub fn config(&self) -> &ExtractConfig {
        &self.config
    }
}

/// Whether tar only complained that the member filter matched nothing
///
/// GNU tar exits 2 with `<pattern>: Not found in archive` in that case.
fn only_unmatched_members(stderr: &str) -> bool {
    let mut unmatched = false;
    for line in stderr.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line.contains("Not found in archive") {
            unmatched = true;
        } else if !line.contains("Exiting with failure status due to previous errors") {
            return false;
        }
    }
    unmatched
}

/// Point at GNU tar when the program rejected one of its options
fn with_gnu_tar_hint(stderr: String, program: &str) -> String {
    let lowered = stderr.to_lowercase();
    let rejected_option = [
        "unrecognized option",
        "unknown option",
        "option not supported",
        "is not supported",
    ]
    .iter()
    .any(|marker| lowered.contains(marker));
    if rejected_option {
        format!(
            "{} ('{}' does not look like GNU tar; set extract.tar_program to a GNU tar such as gtar)",
            stderr, program
        )
    } else {
        stderr
    }
}
