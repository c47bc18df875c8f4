//! Crash-safe status ledger
//!
//! The ledger maps every task id ever enumerated to its [`TransferState`] and
//! is the durable record of what has been fully retrieved. It is serialized
//! as a whole on every significant state change and written with the
//! temp-file + fsync + rename pattern, so a crash mid-write always leaves the
//! previous valid version in place and an external process can read the file
//! at any moment without coordination.
//!
//! # Basic Usage
//!
//! ```rust,no_run
//! use katago_fetcher::app::ledger::{Ledger, LedgerConfig};
//! use std::path::PathBuf;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = LedgerConfig::new(PathBuf::from("katago_games/download_status.json"));
//! let mut ledger = Ledger::load(config)?;
//!
//! let counts = ledger.counts();
//! println!("{} archives completed", counts.completed);
//! ledger.flush()?;
//! # Ok(())
//! # }
//! ```
//!
//! [`TransferState`]: crate::app::models::TransferState

pub mod config;
pub mod store;


pub use config::LedgerConfig;
pub use store::{Ledger, LedgerCounts};
