//! Command-line interface components
//!
//! This module contains CLI-specific code for the KataGo Fetcher application,
//! including argument parsing, command handlers and progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{
    Cli, Commands, ConfigAction, ConfigArgs, DownloadArgs, ExtractArgs, GlobalArgs, ListArgs,
    StatusArgs,
};
pub use commands::{handle_config, handle_download, handle_extract, handle_list, handle_status};
pub use progress::{create_spinner, create_transfer_bar};
