//! Prelude module for KataGo Fetcher Library
//!
//! Re-exports the items most integrations need, so a single
//! `use katago_fetcher::prelude::*;` is enough to drive a download run.
//!
//! # Usage
//!
//! ```rust,no_run
//! use katago_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None).await?;
//!     let ledger = Ledger::load(config.transfer.ledger_config())?;
//!     println!("{} archives tracked", ledger.len());
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

// Configuration
pub use crate::config::AppConfig;

// Essential app components
pub use crate::app::{
    enumerate_tasks, ClientConfig, DateRange, EnumeratorConfig, ExtractConfig, Extractor,
    Ledger, LedgerConfig, PacedClient, RunSummary, TaskOrder, TransferConfig, TransferManager,
    TransferState, TransferStatus, TransferTask,
};

// Commonly used constants
pub use crate::constants::{BASE_URL, DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY, LEDGER_FILE_NAME};

// Standard library re-exports that are commonly needed
pub use std::path::{Path, PathBuf};

pub use tokio;
