//! Command handlers for KataGo Fetcher CLI
//!
//! This module implements the command handlers that turn parsed arguments
//! and the loaded configuration into calls on the core application types.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::app::listing::{fetch_listing, retain_listed, total_size_hint};
use crate::app::{
    enumerate_tasks, Extractor, Ledger, LedgerConfig, PacedClient, TaskOrder, TransferManager,
    TransferStatus, TransferTask,
};
use crate::cli::args::{ConfigAction, ConfigArgs, DownloadArgs, ExtractArgs, ListArgs, StatusArgs};
use crate::cli::progress::{create_spinner, create_transfer_bar};
use crate::config::{AppConfig, LOCAL_CONFIG_FILE};
use crate::errors::{AppError, LedgerError, Result};

const DRY_RUN_PREVIEW: usize = 10;

/// Handle the download command
///
/// Resolves the date range, optionally filters it against the origin's
/// index page, then hands the task list to a [`TransferManager`].
pub async fn handle_download(mut config: AppConfig, args: DownloadArgs, quiet: bool) -> Result<()> {
    args.validate().map_err(AppError::generic)?;
    apply_download_overrides(&mut config, &args);
    config.validate()?;

    let range = config
        .range
        .to_date_range(args.start_date.as_deref(), args.end_date.as_deref())?;
    info!(
        "Date range {} to {} ({} days)",
        range.start(),
        range.end(),
        range.days()
    );

    let client_config = config.client.to_runtime_config()?;
    let enumerator_config = config
        .transfer
        .enumerator_config(client_config.base_url.clone());
    let mut tasks = enumerate_tasks(&range, &enumerator_config)?;

    let mut client = PacedClient::new(client_config)?;

    if args.only_listed {
        let spinner = create_spinner("Fetching archive index...")?;
        let listings = fetch_listing(&mut client).await;
        spinner.finish_and_clear();
        tasks = retain_listed(tasks, &listings?);
    }

    if tasks.is_empty() {
        warn!("Nothing to download in the selected range");
        println!("No archives to download.");
        return Ok(());
    }

    if args.dry_run {
        print_dry_run(&tasks);
        return Ok(());
    }

    let ledger = open_ledger(config.transfer.ledger_config(), args.reset_ledger)?;
    let download_dir = config.transfer.download_dir.clone();
    let transfer_config = config.transfer.to_runtime_config();
    let extract_on_completion = transfer_config.extract_on_completion;

    let bar = create_transfer_bar(!args.no_progress && !quiet)?;
    let mut manager = TransferManager::new(transfer_config, ledger, client).with_progress(bar);
    if extract_on_completion {
        manager = manager.with_extractor(Extractor::new(
            config.extract.to_runtime_config(&download_dir),
        ));
    }

    let summary = manager.run(tasks).await?;
    summary.log();

    println!();
    println!("Download summary:");
    println!(
        "  Completed:        {} new, {} already present",
        summary.completed, summary.already_complete
    );
    println!("  Failed:           {}", summary.failed);
    if summary.skipped_failed > 0 {
        println!(
            "  Skipped (failed): {} (rerun with --force-retry)",
            summary.skipped_failed
        );
    }
    println!("  Transferred:      {:.2} GB", summary.gigabytes());
    println!("  Requests:         {}", summary.requests_sent);
    if extract_on_completion {
        println!(
            "  Extracted:        {} ({} failed)",
            summary.extracted, summary.extraction_failures
        );
    }
    println!("  Ledger:           {}", manager.ledger().path().display());

    Ok(())
}

/// Fold download flags into the loaded configuration
fn apply_download_overrides(config: &mut AppConfig, args: &DownloadArgs) {
    if let Some(delay) = args.min_delay() {
        config.client.min_delay = delay;
    }
    if let Some(max_retries) = args.max_retries {
        config.transfer.max_retries = max_retries;
    }
    if args.max_files.is_some() {
        config.transfer.max_files = args.max_files;
    }
    if args.newest_first {
        config.transfer.order = TaskOrder::NewestFirst;
    }
    if args.extract {
        config.transfer.extract_on_completion = true;
    }
    if args.force_retry {
        config.transfer.force_retry = true;
    }
}

/// Load the ledger, moving a corrupt one aside when asked to
fn open_ledger(config: LedgerConfig, reset_corrupt: bool) -> Result<Ledger> {
    match Ledger::load(config.clone()) {
        Ok(ledger) => Ok(ledger),
        Err(LedgerError::Corrupt { path, reason }) if reset_corrupt => {
            warn!("Ledger {} is corrupt ({}); starting fresh", path.display(), reason);
            Ledger::quarantine_corrupt(&path)?;
            Ok(Ledger::new(config))
        }
        Err(e) => Err(e.into()),
    }
}

fn print_dry_run(tasks: &[TransferTask]) {
    println!("Dry run - would download {} archives:", tasks.len());
    for (i, task) in tasks.iter().take(DRY_RUN_PREVIEW).enumerate() {
        println!("  {}. {} -> {}", i + 1, task.url, task.destination.display());
    }
    if tasks.len() > DRY_RUN_PREVIEW {
        println!("  ... and {} more archives", tasks.len() - DRY_RUN_PREVIEW);
    }
}

/// Handle the status command
pub async fn handle_status(config: AppConfig, args: StatusArgs) -> Result<()> {
    let ledger = Ledger::load(config.transfer.ledger_config())?;
    let counts = ledger.counts();

    println!("Ledger: {}", ledger.path().display());
    if ledger.is_empty() {
        println!("  No archives recorded yet.");
        return Ok(());
    }

    println!("  Completed:   {}", counts.completed);
    println!("  In progress: {}", counts.in_progress);
    println!("  Pending:     {}", counts.pending);
    println!("  Failed:      {}", counts.failed);
    println!("  Total:       {}", counts.total());

    let completed_bytes: u64 = ledger
        .iter()
        .filter(|(_, state)| state.is_completed())
        .filter_map(|(_, state)| state.total_bytes)
        .sum();
    println!(
        "  Downloaded:  {:.2} GB",
        completed_bytes as f64 / (1024.0 * 1024.0 * 1024.0)
    );

    if args.in_progress {
        println!();
        println!("In progress:");
        for (id, state) in ledger
            .iter()
            .filter(|(_, s)| s.status == TransferStatus::InProgress)
        {
            match state.total_bytes {
                Some(total) => println!("  {}  {}/{} bytes", id, state.bytes_downloaded, total),
                None => println!("  {}  {} bytes", id, state.bytes_downloaded),
            }
        }
    }

    if args.failed && counts.failed > 0 {
        println!();
        println!("Failed:");
        for (id, state) in ledger.failed() {
            println!(
                "  {}  after {} attempts: {}",
                id,
                state.retry_count,
                state.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    } else if counts.failed > 0 {
        println!();
        println!("Use --failed to list failed archives, or download --force-retry to retry them.");
    }

    Ok(())
}

/// Handle the extract command
pub async fn handle_extract(config: AppConfig, args: ExtractArgs) -> Result<()> {
    let ledger = Ledger::load(config.transfer.ledger_config())?;
    let download_dir = config.transfer.download_dir.clone();

    let mut extract_config = config.extract.to_runtime_config(&download_dir);
    if args.all_files {
        extract_config.member_pattern = None;
    }
    let extractor = Extractor::new(extract_config);

    let completed = ledger.counts().completed;
    if completed == 0 {
        println!("No completed archives to extract.");
        return Ok(());
    }

    info!(
        "Extracting {} completed archives into {}",
        completed,
        extractor.config().output_dir.display()
    );
    let report = extractor.extract_completed(&ledger, &download_dir).await;

    println!(
        "Extracted {} archives into {} ({} failed)",
        report.extracted,
        extractor.config().output_dir.display(),
        report.failed
    );
    if report.failed > 0 {
        return Err(AppError::generic(format!(
            "{} archives failed to extract, see the log for details",
            report.failed
        )));
    }
    Ok(())
}

/// Handle the list command
pub async fn handle_list(config: AppConfig, args: ListArgs) -> Result<()> {
    let start = args
        .start_date
        .as_deref()
        .map(crate::app::enumerator::parse_date)
        .transpose()?;
    let end = args
        .end_date
        .as_deref()
        .map(crate::app::enumerator::parse_date)
        .transpose()?;

    let mut client = PacedClient::new(config.client.to_runtime_config()?)?;
    let spinner = create_spinner("Fetching archive index...")?;
    let listings = fetch_listing(&mut client).await;
    spinner.finish_and_clear();

    let mut listings = listings?;
    listings.retain(|l| match l.date {
        Some(date) => start.map_or(true, |s| date >= s) && end.map_or(true, |e| date <= e),
        None => start.is_none() && end.is_none(),
    });
    let matched = listings.len();
    if let Some(limit) = args.limit {
        listings.truncate(limit);
    }

    for listing in &listings {
        match listing.size_hint {
            Some(size) => println!("{:>10}  {}", format_size(size), listing.name),
            None => println!("{:>10}  {}", "-", listing.name),
        }
    }

    println!();
    println!(
        "{} archives listed, about {} advertised",
        matched,
        format_size(total_size_hint(&listings))
    );
    if listings.len() < matched {
        println!("(showing the first {})", listings.len());
    }
    Ok(())
}

/// Handle the config command
pub async fn handle_config(config: AppConfig, args: ConfigArgs) -> Result<()> {
    match args.action {
        ConfigAction::Init { path, force } => {
            let path = match path.or_else(AppConfig::default_config_path) {
                Some(path) => path,
                None => {
                    return Err(AppError::generic(
                        "No user config directory on this platform; pass a path",
                    ))
                }
            };
            AppConfig::write_default(&path, force).await?;
            println!("Wrote default configuration to {}", path.display());
        }
        ConfigAction::Show => {
            print!("{}", config.to_toml_string()?);
        }
        ConfigAction::Path => {
            println!("Configuration files are searched in order:");
            println!("  1. --config FILE");
            println!("  2. {}", Path::new(".").join(LOCAL_CONFIG_FILE).display());
            match AppConfig::default_config_path() {
                Some(path) => println!("  3. {}", path.display()),
                None => println!("  3. (no user config directory on this platform)"),
            }
            match AppConfig::find_config_file() {
                Some(found) => println!("Active: {}", found.display()),
                None => {
                    debug!("No configuration file found");
                    println!("Active: built-in defaults");
                }
            }
        }
    }
    Ok(())
}

/// Human-readable byte count
fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
