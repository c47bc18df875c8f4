//! Error types for KataGo Fetcher
//!
//! This module defines error types for all components of the application.
//! Per-archive transfer errors are contained by the transfer manager, while
//! ledger, enumeration and configuration errors abort the whole run.

use std::path::PathBuf;

use thiserror::Error;

/// Target enumeration errors
#[derive(Error, Debug)]
pub enum EnumerationError {
    /// Start date after end date
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },

    /// Date string could not be parsed
    #[error("Invalid date '{value}': expected YYYY-MM-DD ({reason})")]
    InvalidDate { value: String, reason: String },
}

/// Status ledger errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// Ledger file exists but does not parse
    #[error(
        "Ledger file {path} is corrupt: {reason}. Rerun with --reset-ledger to move it aside and start fresh"
    )]
    Corrupt { path: PathBuf, reason: String },

    /// I/O error reading or writing the ledger
    #[error("Ledger I/O error")]
    Io(#[from] std::io::Error),

    /// Serialization failure
    #[error("Ledger serialization failed")]
    Serialize(#[from] serde_json::Error),

    /// Atomic rename of the temp file failed
    #[error("Could not persist ledger to {path}: {reason}")]
    Persist { path: PathBuf, reason: String },

    /// Ledger written by an incompatible version
    #[error("Ledger schema version mismatch. Expected: {expected}, found: {found}")]
    SchemaMismatch { expected: u32, found: u32 },
}

/// Download and HTTP transport errors
#[derive(Error, Debug)]
pub enum TransferError {
    /// Throttling persisted through every backoff attempt
    #[error("Origin kept throttling {url} after {attempts} attempts")]
    ThrottledExhausted { url: String, attempts: u32 },

    /// Non-retryable response from the origin
    #[error("Origin refused {url}: HTTP {status}")]
    PermanentFetchError { url: String, status: u16 },

    /// Transient network failures persisted through every attempt
    #[error("Network failure fetching {url} after {attempts} attempts: {reason}")]
    NetworkExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    /// Final size differs from the origin-reported total
    #[error("File size mismatch. Expected: {expected} bytes, got: {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Partial response does not start where the local file ends
    #[error("Origin answered range request for byte {requested} from byte {received}")]
    UnexpectedRange { requested: u64, received: u64 },

    /// No body data arrived within the stall timeout
    #[error("Transfer stalled: no data received for {seconds} seconds")]
    Stalled { seconds: u64 },

    /// HTTP error while reading a response body
    #[error("HTTP transfer failed: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error on the destination file
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL could not be built
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Ledger update failed mid-transfer
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl TransferError {
    /// Whether the error must abort the whole run rather than one archive
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransferError::Ledger(_))
    }

    /// Whether retrying the archive can never succeed
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TransferError::PermanentFetchError { .. } | TransferError::InvalidUrl { .. }
        )
    }
}

/// Archive extraction errors
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// Archive to extract is not on disk
    #[error("Archive not found: {path}")]
    ArchiveMissing { path: PathBuf },

    /// Decompression program could not be started
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Decompression program reported failure
    #[error("Extraction of {path} failed (exit code {code:?}): {stderr}")]
    Failed {
        path: PathBuf,
        code: Option<i32>,
        stderr: String,
    },

    /// I/O error preparing the output directory
    #[error("Extraction I/O error")]
    Io(#[from] std::io::Error),
}

/// Remote listing errors
#[derive(Error, Debug)]
pub enum ListingError {
    /// Index page could not be fetched
    #[error("Failed to fetch archive index")]
    Fetch(#[from] TransferError),

    /// CSS selector error
    #[error("Invalid CSS selector: {selector}")]
    InvalidSelector { selector: String },
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format in {path}: {source}")]
    InvalidFormat {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Configuration could not be rendered
    #[error("Configuration serialization failed")]
    Serialize(#[from] toml::ser::Error),

    /// Missing required configuration field
    #[error("Missing required configuration field: {field}")]
    MissingField { field: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Configuration file I/O failed
    #[error("Configuration file I/O error")]
    Io(#[from] std::io::Error),
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Enumeration error
    #[error(transparent)]
    Enumeration(#[from] EnumerationError),

    /// Ledger error
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Transfer error
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Extraction error
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Listing error
    #[error(transparent)]
    Listing(#[from] ListingError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Transfer(TransferError::ThrottledExhausted { .. })
            | AppError::Transfer(TransferError::NetworkExhausted { .. })
            | AppError::Transfer(TransferError::Stalled { .. })
            | AppError::Transfer(TransferError::SizeMismatch { .. })
            | AppError::Transfer(TransferError::UnexpectedRange { .. })
            | AppError::Transfer(TransferError::Http(_))
            | AppError::Listing(ListingError::Fetch(_)) => true,

            AppError::Ledger(_)
            | AppError::Enumeration(_)
            | AppError::Config(_)
            | AppError::Transfer(TransferError::PermanentFetchError { .. }) => false,

            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Enumeration(_) => "enumeration",
            AppError::Ledger(_) => "ledger",
            AppError::Transfer(_) => "transfer",
            AppError::Extraction(_) => "extraction",
            AppError::Listing(_) => "listing",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Enumeration result type alias
pub type EnumerationResult<T> = std::result::Result<T, EnumerationError>;

/// Ledger result type alias
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Transfer result type alias
pub type TransferResult<T> = std::result::Result<T, TransferError>;

/// Extraction result type alias
pub type ExtractionResult<T> = std::result::Result<T, ExtractionError>;

/// Listing result type alias
pub type ListingResult<T> = std::result::Result<T, ListingError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
