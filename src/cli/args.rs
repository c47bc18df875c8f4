//! Command-line argument parsing for KataGo Fetcher
//!
//! This module defines the CLI structure using clap derive macros: a set of
//! global flags plus subcommands for downloading, inspecting the ledger,
//! extracting, listing the origin and managing the configuration file.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

/// KataGo Fetcher - Download KataGo self-play training games
#[derive(Parser, Debug)]
#[command(
    name = "katago_fetcher",
    version,
    about = "Resumable, rate-limited downloader for KataGo training game archives",
    long_about = "Downloads the daily <date>sgfs.tar.bz2 self-play archives one at a time.
Requests are paced and back off on throttling, partial files resume where they stopped,
and a status ledger records what has been retrieved so interrupted runs pick up cleanly."
)]
pub struct Cli {
    /// Global options
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Global arguments available to all subcommands
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Very verbose logging (trace level)
    #[arg(long, global = true)]
    pub very_verbose: bool,

    /// Quiet mode - only errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file path
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Download directory (archives, ledger and log)
    #[arg(short = 'd', long = "dir", global = true, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Do not append to the log file
    #[arg(long, global = true)]
    pub no_log_file: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download archives for a date range
    Download(DownloadArgs),

    /// Show ledger counts and failed archives
    Status(StatusArgs),

    /// Extract every completed archive
    Extract(ExtractArgs),

    /// List archives advertised by the origin's index page
    List(ListArgs),

    /// Manage the configuration file
    Config(ConfigArgs),
}

/// Arguments for the download command
#[derive(Args, Debug, Clone, Default)]
pub struct DownloadArgs {
    /// First archive date (YYYY-MM-DD)
    #[arg(short, long, value_name = "DATE")]
    pub start_date: Option<String>,

    /// Last archive date (YYYY-MM-DD), defaults to today
    #[arg(short, long, value_name = "DATE")]
    pub end_date: Option<String>,

    /// Minimum delay between requests in seconds
    #[arg(long, value_name = "SECONDS")]
    pub delay: Option<f64>,

    /// Failed passes per archive before it is marked failed
    #[arg(long, value_name = "N")]
    pub max_retries: Option<u32>,

    /// Stop after this many archives
    #[arg(short = 'n', long, value_name = "N")]
    pub max_files: Option<usize>,

    /// Process the newest archives first
    #[arg(long)]
    pub newest_first: bool,

    /// Extract each archive once it completes
    #[arg(short = 'x', long)]
    pub extract: bool,

    /// Give previously failed archives a fresh retry budget
    #[arg(long)]
    pub force_retry: bool,

    /// Only download dates the origin's index page lists
    #[arg(long)]
    pub only_listed: bool,

    /// Move a corrupt ledger aside and start a fresh one
    #[arg(long)]
    pub reset_ledger: bool,

    /// Disable the progress bar
    #[arg(long)]
    pub no_progress: bool,

    /// Show what would be downloaded without downloading
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the status command
#[derive(Args, Debug, Clone, Default)]
pub struct StatusArgs {
    /// List every failed archive with its last error
    #[arg(short, long)]
    pub failed: bool,

    /// List archives that are partially downloaded
    #[arg(long)]
    pub in_progress: bool,
}

/// Arguments for the extract command
#[derive(Args, Debug, Clone, Default)]
pub struct ExtractArgs {
    /// Extract every member, not only .sgf game records
    #[arg(long)]
    pub all_files: bool,
}

/// Arguments for the list command
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Only show archives on or after this date
    #[arg(short, long, value_name = "DATE")]
    pub start_date: Option<String>,

    /// Only show archives on or before this date
    #[arg(short, long, value_name = "DATE")]
    pub end_date: Option<String>,

    /// Show at most this many archives
    #[arg(short = 'n', long, value_name = "N")]
    pub limit: Option<usize>,
}

/// Arguments for configuration management
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a commented default configuration file
    Init {
        /// Where to write it, defaults to the user config directory
        #[arg(value_name = "FILE")]
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,

    /// Print where configuration files are searched for
    Path,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the log filter level, starting from the configured default
    pub fn log_level(&self, configured: &str) -> String {
        if self.global.quiet {
            "error".to_string()
        } else if self.global.very_verbose {
            "trace".to_string()
        } else if self.global.verbose {
            "debug".to_string()
        } else {
            configured.to_string()
        }
    }
}

impl DownloadArgs {
    /// Check argument values that clap cannot
    pub fn validate(&self) -> Result<(), String> {
        if let Some(delay) = self.delay {
            if !delay.is_finite() || delay < 0.0 {
                return Err(format!("--delay must be a non-negative number, got {}", delay));
            }
        }

        if self.max_retries == Some(0) {
            return Err("--max-retries must be at least 1".to_string());
        }

        if self.max_files == Some(0) {
            return Err("--max-files must be at least 1".to_string());
        }

        Ok(())
    }

    /// The requested minimum delay as a duration
    pub fn min_delay(&self) -> Option<Duration> {
        self.delay.map(Duration::from_secs_f64)
    }
}
