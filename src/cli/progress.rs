//! Terminal progress display for archive transfers
//!
//! Downloads are serial, so a single byte-oriented bar is enough: the
//! transfer manager resets its length and position for each archive and
//! labels it with the archive date.

use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::errors::{AppError, Result};

const TRANSFER_TEMPLATE: &str =
    "{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";

/// Byte progress bar for the archive currently downloading
///
/// Returns a hidden bar when `enabled` is false so callers never branch.
pub fn create_transfer_bar(enabled: bool) -> Result<ProgressBar> {
    if !enabled {
        return Ok(ProgressBar::hidden());
    }

    let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
    bar.set_style(
        ProgressStyle::default_bar()
            .template(TRANSFER_TEMPLATE)
            .map_err(|e| AppError::generic(format!("Progress bar template error: {}", e)))?
            .progress_chars("##-"),
    );
    bar.enable_steady_tick(Duration::from_millis(200));
    Ok(bar)
}

/// Spinner shown while fetching the index page or extracting
pub fn create_spinner(message: impl Into<String>) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .map_err(|e| AppError::generic(format!("Spinner template error: {}", e)))?
            .tick_strings(&["◐", "◓", "◑", "◒"]),
    );
    spinner.set_message(message.into());
    spinner.enable_steady_tick(Duration::from_millis(120));
    Ok(spinner)
}
