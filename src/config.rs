//! Configuration management for KataGo Fetcher
//!
//! This module provides the TOML configuration file, its search order and
//! the conversion of each section into the runtime configuration of the
//! component it drives. Command-line flags override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::app::{
    ClientConfig, DateRange, EnumeratorConfig, ExtractConfig, LedgerConfig, TaskOrder,
    TransferConfig,
};
use crate::app::enumerator::parse_date;
use crate::constants::{extract, files, http, ledger, limits, logging, origin};
use crate::errors::{AppError, ConfigError, ConfigResult, Result};

/// File name searched for in the working directory
pub const LOCAL_CONFIG_FILE: &str = "katago-fetcher.toml";

/// Unified application configuration for TOML serialization
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Origin and transport settings
    pub client: ClientConfigToml,
    /// Transfer manager and ledger settings
    pub transfer: TransferConfigToml,
    /// Date range to download
    pub range: RangeConfigToml,
    /// Extraction settings
    pub extract: ExtractConfigToml,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// TOML-friendly client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfigToml {
    /// Directory on the origin holding the archives
    pub base_url: String,
    /// Minimum delay between the end of one request and the start of the next
    #[serde(with = "humantime_serde")]
    pub min_delay: Duration,
    /// Attempts per request on throttling or transient failures
    pub max_attempts: u32,
    /// Cap on the backoff multiplier
    pub backoff_ceiling: u32,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub response_timeout: Duration,
    #[serde(
        with = "humantime_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub tcp_keepalive: Option<Duration>,
    #[serde(
        with = "humantime_serde::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub pool_idle_timeout: Option<Duration>,
    pub user_agent: String,
}

impl Default for ClientConfigToml {
    fn default() -> Self {
        Self {
            base_url: origin::BASE_URL.to_string(),
            min_delay: limits::DEFAULT_MIN_DELAY,
            max_attempts: limits::DEFAULT_MAX_ATTEMPTS,
            backoff_ceiling: limits::DEFAULT_BACKOFF_CEILING,
            connect_timeout: http::CONNECT_TIMEOUT,
            response_timeout: http::RESPONSE_TIMEOUT,
            tcp_keepalive: Some(http::TCP_KEEPALIVE),
            pool_idle_timeout: Some(http::POOL_IDLE_TIMEOUT),
            user_agent: http::USER_AGENT.to_string(),
        }
    }
}

/// TOML-friendly transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfigToml {
    /// Directory archives, the ledger and the log are written to
    pub download_dir: PathBuf,
    /// Failed passes per archive before it is marked failed
    pub max_retries: u32,
    /// Maximum silence between two body chunks
    #[serde(with = "humantime_serde")]
    pub stall_timeout: Duration,
    /// Production order of the dated archives
    pub order: TaskOrder,
    /// Stop after this many archives
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    /// Give previously failed archives a fresh retry budget
    pub force_retry: bool,
    /// Extract each archive once it completes
    pub extract_on_completion: bool,
    /// Ledger location, defaults to the download directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_file: Option<PathBuf>,
    /// Download progress accumulated before a forced ledger flush
    pub flush_threshold_bytes: u64,
}

impl Default for TransferConfigToml {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from(files::DEFAULT_DOWNLOAD_DIR),
            max_retries: limits::DEFAULT_MAX_RETRIES,
            stall_timeout: http::STALL_TIMEOUT,
            order: TaskOrder::default(),
            max_files: None,
            force_retry: false,
            extract_on_completion: false,
            ledger_file: None,
            flush_threshold_bytes: ledger::DEFAULT_FLUSH_THRESHOLD_BYTES,
        }
    }
}

/// TOML-friendly date range
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeConfigToml {
    /// First archive date, `YYYY-MM-DD`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Last archive date, defaults to today
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

/// TOML-friendly extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfigToml {
    /// Decompression program
    pub tar_program: String,
    /// Only extract `.sgf` game records
    pub sgf_only: bool,
    /// Output root, defaults to `<download_dir>/extracted`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

impl Default for ExtractConfigToml {
    fn default() -> Self {
        Self {
            tar_program: extract::TAR_PROGRAM.to_string(),
            sgf_only: true,
            output_dir: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default log level for the application
    pub level: String,
    /// Append log lines to a file as well as stdout
    pub file_logging: bool,
    /// Log file path, defaults to `<download_dir>/download.log`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    /// Enable colored terminal output
    pub colored_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: logging::DEFAULT_LOG_LEVEL.to_string(),
            file_logging: true,
            log_file: None,
            colored_output: true,
        }
    }
}

impl LoggingConfig {
    /// Effective log file path for a download directory
    pub fn log_file_in(&self, download_dir: &Path) -> Option<PathBuf> {
        if !self.file_logging {
            return None;
        }
        Some(
            self.log_file
                .clone()
                .unwrap_or_else(|| download_dir.join(files::LOG_FILE_NAME)),
        )
    }
}

impl AppConfig {
    /// Load configuration with precedence:
    /// 1. Explicit config file (must exist)
    /// 2. `./katago-fetcher.toml`
    /// 3. User config directory
    /// 4. Default values
    pub async fn load(config_file_override: Option<PathBuf>) -> Result<Self> {
        let config_path = match config_file_override {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound { path }.into());
                }
                Some(path)
            }
            None => Self::find_config_file(),
        };

        match config_path {
            Some(path) => Self::load_from_file(&path).await,
            None => {
                debug!("No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Find configuration file in standard locations
    pub fn find_config_file() -> Option<PathBuf> {
        let mut search_paths = vec![PathBuf::from(".").join(LOCAL_CONFIG_FILE)];
        if let Some(user_path) = Self::default_config_path() {
            search_paths.push(user_path);
        }

        for path in search_paths {
            if path.exists() {
                debug!("Found config file: {}", path.display());
                return Some(path);
            }
        }
        None
    }

    /// The config file path for the current user
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("katago-fetcher").join("config.toml"))
    }

    /// Load configuration from a TOML file
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(ConfigError::Io)?;

        let config: AppConfig =
            toml::from_str(&content).map_err(|e| ConfigError::InvalidFormat {
                path: path.to_path_buf(),
                source: e,
            })?;

        info!("Loaded configuration from: {}", path.display());
        Ok(config)
    }

    /// Write a commented default configuration file
    ///
    /// Refuses to overwrite an existing file unless `force` is set.
    pub async fn write_default(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            return Err(AppError::generic(format!(
                "Config file {} already exists (use --force to overwrite)",
                path.display()
            )));
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(ConfigError::Io)?;
            }
        }

        tokio::fs::write(path, Self::generate_default_config_content())
            .await
            .map_err(ConfigError::Io)?;
        info!("Wrote default configuration to {}", path.display());
        Ok(())
    }

    /// Effective configuration as TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every section's values
    pub fn validate(&self) -> Result<()> {
        self.client.to_runtime_config()?.validate()?;
        self.transfer.to_runtime_config().validate()?;
        if self.transfer.flush_threshold_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "transfer.flush_threshold_bytes".to_string(),
                value: "0".to_string(),
                reason: "Use 1 to flush after every chunk".to_string(),
            }
            .into());
        }
        match self.range.to_date_range(None, None) {
            Ok(_) | Err(AppError::Config(ConfigError::MissingField { .. })) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Generate default configuration content with helpful comments
    pub fn generate_default_config_content() -> String {
        format!(
            r#"# KataGo Fetcher Configuration
# Durations accept human-readable values such as "2s", "500ms" or "1m 30s".

[client]
# Directory on the origin that holds the daily archives
base_url = "{base_url}"
# Hard floor between the end of one request and the start of the next
min_delay = "{min_delay}s"
# Attempts per request on throttling (429/503) or network errors
max_attempts = {max_attempts}
# Backoff multiplier cap (delay = min_delay x multiplier)
backoff_ceiling = {backoff_ceiling}
connect_timeout = "{connect_timeout}s"
response_timeout = "{response_timeout}s"
tcp_keepalive = "{tcp_keepalive}s"
pool_idle_timeout = "{pool_idle_timeout}s"

[transfer]
download_dir = "{download_dir}"
# Failed passes per archive before it is marked failed
max_retries = {max_retries}
# Abandon a transfer after this long without data
stall_timeout = "{stall_timeout}s"
order = "oldest_first"  # oldest_first, newest_first
# max_files = 10
force_retry = false
extract_on_completion = false
# ledger_file = "/path/to/download_status.json"
flush_threshold_bytes = {flush_threshold}

[range]
# start_date = "2021-01-01"
# end_date = "2021-12-31"  # Defaults to today

[extract]
tar_program = "{tar_program}"
# Only unpack .sgf game records
sgf_only = true
# output_dir = "/path/to/extracted"

[logging]
level = "{level}"  # error, warn, info, debug, trace
# Append to <download_dir>/{log_file} unless log_file is set
file_logging = true
colored_output = true
# log_file = "/path/to/download.log"
"#,
            base_url = origin::BASE_URL,
            min_delay = limits::DEFAULT_MIN_DELAY.as_secs(),
            max_attempts = limits::DEFAULT_MAX_ATTEMPTS,
            backoff_ceiling = limits::DEFAULT_BACKOFF_CEILING,
            connect_timeout = http::CONNECT_TIMEOUT.as_secs(),
            response_timeout = http::RESPONSE_TIMEOUT.as_secs(),
            tcp_keepalive = http::TCP_KEEPALIVE.as_secs(),
            pool_idle_timeout = http::POOL_IDLE_TIMEOUT.as_secs(),
            download_dir = files::DEFAULT_DOWNLOAD_DIR,
            max_retries = limits::DEFAULT_MAX_RETRIES,
            stall_timeout = http::STALL_TIMEOUT.as_secs(),
            flush_threshold = ledger::DEFAULT_FLUSH_THRESHOLD_BYTES,
            tar_program = extract::TAR_PROGRAM,
            level = logging::DEFAULT_LOG_LEVEL,
            log_file = files::LOG_FILE_NAME,
        )
    }
}

impl ClientConfigToml {
    /// Convert to runtime ClientConfig
    pub fn to_runtime_config(&self) -> ConfigResult<ClientConfig> {
        let base_url = Url::parse(&self.base_url).map_err(|e| ConfigError::InvalidValue {
            field: "client.base_url".to_string(),
            value: self.base_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(ClientConfig {
            base_url,
            min_delay: self.min_delay,
            max_attempts: self.max_attempts,
            backoff_ceiling: self.backoff_ceiling,
            connect_timeout: self.connect_timeout,
            response_timeout: self.response_timeout,
            tcp_keepalive: self.tcp_keepalive,
            pool_idle_timeout: self.pool_idle_timeout,
            user_agent: self.user_agent.clone(),
        })
    }
}

impl TransferConfigToml {
    /// Convert to runtime TransferConfig
    pub fn to_runtime_config(&self) -> TransferConfig {
        TransferConfig {
            download_dir: self.download_dir.clone(),
            max_retries: self.max_retries,
            stall_timeout: self.stall_timeout,
            force_retry: self.force_retry,
            extract_on_completion: self.extract_on_completion,
        }
    }

    /// Ledger location and flush policy
    pub fn ledger_config(&self) -> LedgerConfig {
        let config = match &self.ledger_file {
            Some(path) => LedgerConfig::new(path.clone()),
            None => LedgerConfig::in_download_dir(&self.download_dir),
        };
        config.with_flush_threshold(self.flush_threshold_bytes)
    }

    /// Enumeration settings against the given origin
    pub fn enumerator_config(&self, base_url: Url) -> EnumeratorConfig {
        EnumeratorConfig {
            base_url,
            download_dir: self.download_dir.clone(),
            order: self.order,
            max_count: self.max_files,
        }
    }
}

impl RangeConfigToml {
    /// Resolve the range, letting explicit values override the file
    ///
    /// The start date is required; the end date defaults to today. A start
    /// after the end surfaces the enumerator's `InvalidRange` with the dates
    /// actually in effect.
    pub fn to_date_range(
        &self,
        start_override: Option<&str>,
        end_override: Option<&str>,
    ) -> Result<DateRange> {
        let start = start_override
            .or(self.start_date.as_deref())
            .ok_or_else(|| ConfigError::MissingField {
                field: "range.start_date (or --start-date)".to_string(),
            })?;
        let start = parse_date(start).map_err(|e| ConfigError::InvalidValue {
            field: "range.start_date".to_string(),
            value: start.to_string(),
            reason: e.to_string(),
        })?;

        let range = match end_override.or(self.end_date.as_deref()) {
            Some(end) => {
                let end = parse_date(end).map_err(|e| ConfigError::InvalidValue {
                    field: "range.end_date".to_string(),
                    value: end.to_string(),
                    reason: e.to_string(),
                })?;
                DateRange::new(start, end)
            }
            None => DateRange::through_today(start),
        };

        Ok(range?)
    }
}

impl ExtractConfigToml {
    /// Convert to runtime ExtractConfig for a download directory
    pub fn to_runtime_config(&self, download_dir: &Path) -> ExtractConfig {
        let defaults = ExtractConfig::in_download_dir(download_dir);
        ExtractConfig {
            output_dir: self.output_dir.clone().unwrap_or(defaults.output_dir),
            tar_program: self.tar_program.clone(),
            member_pattern: self.sgf_only.then(|| extract::MEMBER_PATTERN.to_string()),
        }
    }
}
