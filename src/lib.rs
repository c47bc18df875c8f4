//! KataGo Fetcher Library
//!
//! A Rust library for retrieving the KataGo self-play training game archives
//! from a slow, rate-limited origin. Downloads are strictly serial, paced,
//! resumable byte-for-byte and tracked in a crash-safe status ledger.

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
