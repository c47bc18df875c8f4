//! Serial transfer manager
//!
//! Drives one run: merges the enumerated tasks into the ledger, skips work
//! that is already done, fetches the rest one archive at a time through the
//! paced transport, and accounts for failures with a bounded retry budget.
//! Per-archive errors are contained; only ledger errors abort a run.

pub mod config;
pub mod manager;
pub mod stats;

#[cfg(test)]
mod tests;

pub use config::TransferConfig;
pub use manager::TransferManager;
pub use stats::RunSummary;
