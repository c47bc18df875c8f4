//! Core application logic for KataGo Fetcher
//!
//! This module contains the download engine: target enumeration, the status
//! ledger, the paced HTTP transport, the serial transfer manager and the
//! extraction stage, plus the remote index listing.
//!
//! # Examples
//!
//! ```rust,no_run
//! use katago_fetcher::app::{
//!     enumerate_tasks, ClientConfig, DateRange, EnumeratorConfig, Ledger, LedgerConfig,
//!     PacedClient, TransferConfig, TransferManager,
//! };
//! use katago_fetcher::app::enumerator::parse_date;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let range = DateRange::new(parse_date("2021-01-01")?, parse_date("2021-01-31")?)?;
//! let tasks = enumerate_tasks(&range, &EnumeratorConfig::default())?;
//!
//! let ledger = Ledger::load(LedgerConfig::default())?;
//! let client = PacedClient::new(ClientConfig::default())?;
//! let mut manager = TransferManager::new(TransferConfig::default(), ledger, client);
//!
//! let summary = manager.run(tasks).await?;
//! summary.log();
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod enumerator;
pub mod extract;
pub mod ledger;
pub mod listing;
pub mod models;
pub mod transfer;

// Re-export main public API
pub use client::{ClientConfig, FetchKind, FetchResponse, PacedClient, ThrottleBackoff};
pub use enumerator::{enumerate_tasks, DateRange, EnumeratorConfig, TaskOrder};
pub use extract::{ExtractConfig, ExtractionReport, Extractor};
pub use ledger::{Ledger, LedgerConfig, LedgerCounts};
pub use listing::{fetch_listing, parse_index, retain_listed, RemoteListing};
pub use models::{TransferState, TransferStatus, TransferTask};
pub use transfer::{RunSummary, TransferConfig, TransferManager};
