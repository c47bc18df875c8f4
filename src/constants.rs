//! Application constants for KataGo Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Archive origin locations and naming
pub mod origin {
    /// Directory listing that holds the self-play training game archives
    pub const BASE_URL: &str = "https://katagoarchive.org/kata1/traininggames/";

    /// Referer presented with every request
    pub const REFERER: &str = "https://katagoarchive.org/kata1/";

    /// Index page listing all available archives
    pub const INDEX_PAGE: &str = "index.html";

    /// Suffix appended to the date stamp to form an archive name
    pub const ARCHIVE_SUFFIX: &str = "sgfs.tar.bz2";

    /// Date format used in archive names and task ids
    pub const DATE_FORMAT: &str = "%Y-%m-%d";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Browser-like user agent; the origin is less aggressive toward it
    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

    /// Accept header for archive downloads
    pub const ACCEPT: &str = "application/octet-stream, application/x-bzip2, */*";

    /// Accept-Language header
    pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Maximum time to wait for response headers
    pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Maximum silence between two body chunks before a transfer is abandoned
    pub const STALL_TIMEOUT: Duration = Duration::from_secs(60);

    /// TCP keep-alive interval for the persistent connection
    pub const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
}

/// Pacing and retry configuration
pub mod limits {
    use super::Duration;

    /// Minimum delay between the end of one request and the start of the next
    pub const DEFAULT_MIN_DELAY: Duration = Duration::from_secs(2);

    /// Maximum failed passes per archive before it is marked failed
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Attempts the transport makes for a single request on throttling or network errors
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

    /// Cap on the throttle backoff multiplier (2s x 32 = 64s)
    pub const DEFAULT_BACKOFF_CEILING: u32 = 32;
}

/// File operation constants
pub mod files {
    /// Ledger file name inside the download directory
    pub const LEDGER_FILE_NAME: &str = "download_status.json";

    /// Log file name inside the download directory
    pub const LOG_FILE_NAME: &str = "download.log";

    /// Directory that receives extracted archives
    pub const EXTRACT_DIR_NAME: &str = "extracted";

    /// Default download directory
    pub const DEFAULT_DOWNLOAD_DIR: &str = "katago_games";

    /// Marker inserted in the name of a quarantined corrupt ledger
    pub const CORRUPT_SUFFIX: &str = "corrupt";
}

/// Ledger persistence constants
pub mod ledger {
    /// Current ledger schema version
    pub const SCHEMA_VERSION: u32 = 1;

    /// Bytes of progress accumulated before a forced ledger flush (8 MiB)
    pub const DEFAULT_FLUSH_THRESHOLD_BYTES: u64 = 8 * 1024 * 1024;
}

/// Extraction constants
pub mod extract {
    /// External program that performs decompression
    pub const TAR_PROGRAM: &str = "tar";

    /// Archive members worth extracting
    pub const MEMBER_PATTERN: &str = "*.sgf";
}

/// Logging and debugging constants
pub mod logging {
    /// Default log level
    pub const DEFAULT_LOG_LEVEL: &str = "info";
}

// Re-export commonly used constants for convenience
pub use files::{LEDGER_FILE_NAME, LOG_FILE_NAME};
pub use http::USER_AGENT;
pub use limits::{DEFAULT_MAX_RETRIES, DEFAULT_MIN_DELAY};
pub use origin::BASE_URL;
