//! Paced HTTP transport for the archive origin
//!
//! This module owns the single persistent connection to the origin and
//! enforces the request discipline it expects: a hard minimum delay between
//! requests, exponential backoff on throttling, and resumable ranged GETs.
//!
//! The module is organized into specialized components:
//! - `config`: HTTP client configuration and building
//! - `pacer`: inter-request pacing floor
//! - `backoff`: throttle backoff policy
//! - `http`: request loop with classification and retries
//! - `response`: usable responses and `Content-Range` parsing

use url::Url;

use crate::errors::{TransferError, TransferResult};

// Module declarations
pub mod backoff;
pub mod config;
pub mod http;
pub mod pacer;
pub mod response;


pub use backoff::ThrottleBackoff;
pub use config::ClientConfig;
pub use http::ResponseClass;
pub use pacer::Pacer;
pub use response::{parse_content_range, ContentRange, FetchKind, FetchResponse};

use http::HttpHandler;

/// Rate-limited client for the archive origin
///
/// Strictly sequential: every method takes `&mut self`, so at most one
/// request is ever in flight.
#[derive(Debug)]
pub struct PacedClient {
    http_handler: HttpHandler,
    config: ClientConfig,
}

impl PacedClient {
    /// Creates a new PacedClient with the given configuration
    ///
    /// # Errors
    ///
    /// Returns `TransferError` if HTTP client creation fails
    pub fn new(config: ClientConfig) -> TransferResult<Self> {
        let client = config.build_http_client()?;
        let http_handler = HttpHandler::new(client, &config);

        tracing::debug!(
            "Created paced client for {} (min delay {:?}, {} attempts)",
            config.base_url,
            config.min_delay,
            config.max_attempts
        );

        Ok(Self {
            http_handler,
            config,
        })
    }

    /// Fetch `url`, resuming from `range_start` when it is non-zero
    ///
    /// The returned response is a 200, 206 or 416. For 200 and 206 the
    /// caller must call [`record_completion`](Self::record_completion) once
    /// it has finished with the body; a 416 carries no body and is stamped
    /// here.
    ///
    /// # Errors
    ///
    /// Returns the transport's terminal error once pacing and backoff are
    /// exhausted, see [`HttpHandler::get_response`].
    pub async fn fetch(&mut self, url: &Url, range_start: u64) -> TransferResult<FetchResponse> {
        let response = self.http_handler.get_response(url, range_start).await?;
        let status = response.status();

        let fetched = FetchResponse::from_response(response).ok_or_else(|| {
            TransferError::PermanentFetchError {
                url: url.to_string(),
                status: status.as_u16(),
            }
        })?;

        if fetched.kind() == FetchKind::RangeNotSatisfiable {
            self.http_handler.record_completion();
        }

        Ok(fetched)
    }

    /// Fetch a page as text through the same pacing and backoff path
    pub async fn fetch_text(&mut self, url: &Url) -> TransferResult<String> {
        let response = self.http_handler.get_response(url, 0).await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            self.http_handler.record_completion();
            return Err(TransferError::PermanentFetchError {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let text = response.text().await;
        self.http_handler.record_completion();
        let text = text?;
        tracing::debug!("Fetched page {} ({} bytes)", url, text.len());
        Ok(text)
    }

    /// Stamp the end of the current request for the pacing floor
    pub fn record_completion(&mut self) {
        self.http_handler.record_completion();
    }

    /// Requests actually put on the wire, retries included
    pub fn requests_sent(&self) -> u64 {
        self.http_handler.requests_sent()
    }

    /// Current throttle backoff state
    pub fn backoff(&self) -> &ThrottleBackoff {
        self.http_handler.backoff()
    }

    /// Get the origin base URL
    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}
