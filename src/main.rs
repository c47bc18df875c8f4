//! KataGo Fetcher CLI application
//!
//! Command-line interface for downloading the KataGo self-play training game
//! archives. Features paced serial downloads, byte-level resume, a crash-safe
//! status ledger and optional extraction.

use std::fs::{self, OpenOptions};
use std::process;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use katago_fetcher::cli::{
    handle_config, handle_download, handle_extract, handle_list, handle_status, Cli, Commands,
};
use katago_fetcher::config::AppConfig;
use katago_fetcher::errors::{AppError, Result};

#[tokio::main]
async fn main() {
    // Initialize program
    let result = run().await;

    // Handle any errors that occurred
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration, then let global flags override it
    let mut config = AppConfig::load(cli.global.config.clone()).await?;
    if let Some(dir) = &cli.global.download_dir {
        config.transfer.download_dir = dir.clone();
    }

    // Only runs that touch the download directory write the log file
    let log_to_file = !cli.global.no_log_file && matches!(cli.command, Commands::Download(_));
    init_logging(&cli, &config, log_to_file)?;

    info!("KataGo Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    let quiet = cli.global.quiet;

    // Execute the appropriate command
    match cli.command {
        Commands::Download(args) => {
            info!("Executing download command");
            handle_download(config, args, quiet).await
        }
        Commands::Status(args) => handle_status(config, args).await,
        Commands::Extract(args) => {
            info!("Executing extract command");
            handle_extract(config, args).await
        }
        Commands::List(args) => handle_list(config, args).await,
        Commands::Config(args) => handle_config(config, args).await,
    }
}

/// Initialize logging to stdout and, when enabled, the append-only log file
fn init_logging(cli: &Cli, config: &AppConfig, log_to_file: bool) -> Result<()> {
    let log_level = cli.log_level(&config.logging.level);

    // Create environment filter
    let directive = format!("katago_fetcher={}", log_level)
        .parse::<Directive>()
        .map_err(|e| AppError::generic(format!("Invalid log level '{}': {}", log_level, e)))?;
    let filter = EnvFilter::from_default_env().add_directive(directive);

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_ansi(config.logging.colored_output)
        .with_level(true);

    let log_path = if log_to_file {
        config
            .logging
            .log_file_in(&config.transfer.download_dir)
    } else {
        None
    };

    let file_layer = match &log_path {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .with_target(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    if let Some(path) = log_path {
        info!("Appending log to {}", path.display());
    }
    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
    Ok(())
}
