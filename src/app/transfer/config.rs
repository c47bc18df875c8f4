//! Transfer manager configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{files, http, limits};
use crate::errors::{ConfigError, ConfigResult};

/// Configuration for a transfer run
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Directory archives are written to
    pub download_dir: PathBuf,
    /// Failed passes per archive before it is marked failed
    pub max_retries: u32,
    /// Maximum silence between two body chunks
    pub stall_timeout: Duration,
    /// Give previously failed archives a fresh retry budget
    pub force_retry: bool,
    /// Run the extraction stage after each completed archive
    pub extract_on_completion: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from(files::DEFAULT_DOWNLOAD_DIR),
            max_retries: limits::DEFAULT_MAX_RETRIES,
            stall_timeout: http::STALL_TIMEOUT,
            force_retry: false,
            extract_on_completion: false,
        }
    }
}

impl TransferConfig {
    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                field: "transfer.max_retries".to_string(),
                value: self.max_retries.to_string(),
                reason: "At least one attempt per archive is required".to_string(),
            });
        }

        if self.stall_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "transfer.stall_timeout".to_string(),
                value: format!("{:?}", self.stall_timeout),
                reason: "Stall timeout must be positive".to_string(),
            });
        }

        Ok(())
    }
}
