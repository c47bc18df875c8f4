//! Core HTTP operations with pacing and throttle backoff
//!
//! Every request goes through [`HttpHandler::get_response`], which waits out
//! the pacing floor, sends the request on the shared client and retries
//! throttling and transient failures under the [`ThrottleBackoff`] policy.

use reqwest::header::RANGE;
use reqwest::{Client, Response, StatusCode};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use url::Url;

use super::backoff::ThrottleBackoff;
use super::config::ClientConfig;
use super::pacer::Pacer;
use crate::errors::{TransferError, TransferResult};

/// How a response status is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    /// 200, 206 and 416 go back to the caller
    Usable,
    /// 429, and 503 which this origin sends interchangeably
    Throttled,
    /// Other 5xx, retried under the same policy
    Transient,
    /// Everything else: retrying cannot help
    Permanent,
}

impl ResponseClass {
    pub fn of(status: StatusCode) -> Self {
        match status {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT | StatusCode::RANGE_NOT_SATISFIABLE => {
                ResponseClass::Usable
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                ResponseClass::Throttled
            }
            s if s.is_server_error() => ResponseClass::Transient,
            _ => ResponseClass::Permanent,
        }
    }
}

/// HTTP operations handler owning the pacing and backoff state
#[derive(Debug)]
pub struct HttpHandler {
    client: Client,
    pacer: Pacer,
    backoff: ThrottleBackoff,
    max_attempts: u32,
    response_timeout: std::time::Duration,
    requests_sent: u64,
}

impl HttpHandler {
    /// Creates a new HttpHandler from a built client and its configuration
    pub fn new(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            pacer: Pacer::new(config.min_delay),
            backoff: ThrottleBackoff::new(config.min_delay, config.backoff_ceiling),
            max_attempts: config.max_attempts.max(1),
            response_timeout: config.response_timeout,
            requests_sent: 0,
        }
    }

    /// Fetches a usable response, pacing and retrying as needed
    ///
    /// Sends `Range: bytes=<range_start>-` when `range_start > 0`. On success
    /// the pacing clock is left for the caller to stamp once the body has
    /// been read.
    ///
    /// # Errors
    ///
    /// * `ThrottledExhausted` if the origin throttled every attempt
    /// * `NetworkExhausted` if every attempt hit a transient failure
    /// * `PermanentFetchError` on a non-retryable status
    pub async fn get_response(&mut self, url: &Url, range_start: u64) -> TransferResult<Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.pacer.wait().await;

            let mut request = self.client.get(url.as_str());
            if range_start > 0 {
                request = request.header(RANGE, format!("bytes={}-", range_start));
            }

            self.requests_sent += 1;
            debug!(
                "GET {} (attempt {}/{}, offset {})",
                url, attempt, self.max_attempts, range_start
            );

            let outcome = match timeout(self.response_timeout, request.send()).await {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err(format!(
                    "no response within {}s",
                    self.response_timeout.as_secs()
                )),
            };

            let response = match outcome {
                Ok(response) => response,
                Err(reason) => {
                    self.pacer.record_completion();
                    if attempt >= self.max_attempts {
                        warn!("Giving up on {} after {} attempts: {}", url, attempt, reason);
                        return Err(TransferError::NetworkExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            reason,
                        });
                    }
                    let delay = self.backoff.next_delay();
                    warn!(
                        "Request failed (attempt {}/{}): {}. Retrying in {}ms",
                        attempt,
                        self.max_attempts,
                        reason,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();
            match ResponseClass::of(status) {
                ResponseClass::Usable => {
                    self.backoff.reset();
                    debug!("Response {} for {}", status, url);
                    return Ok(response);
                }
                ResponseClass::Throttled => {
                    self.pacer.record_completion();
                    if attempt >= self.max_attempts {
                        warn!(
                            "Still throttled ({}) on {} after {} attempts",
                            status, url, attempt
                        );
                        return Err(TransferError::ThrottledExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                        });
                    }
                    let delay = self.backoff.next_delay();
                    warn!(
                        "Throttled by origin ({}). Backing off for {}ms (multiplier x{})",
                        status,
                        delay.as_millis(),
                        self.backoff.multiplier()
                    );
                    sleep(delay).await;
                }
                ResponseClass::Transient => {
                    self.pacer.record_completion();
                    let reason = format!("HTTP {}", status.as_u16());
                    if attempt >= self.max_attempts {
                        return Err(TransferError::NetworkExhausted {
                            url: url.to_string(),
                            attempts: attempt,
                            reason,
                        });
                    }
                    let delay = self.backoff.next_delay();
                    warn!(
                        "Server error {} (attempt {}/{}). Retrying in {}ms",
                        status,
                        attempt,
                        self.max_attempts,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
                ResponseClass::Permanent => {
                    self.pacer.record_completion();
                    self.backoff.reset();
                    return Err(TransferError::PermanentFetchError {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
            }
        }
    }

    /// Stamp the end of a request whose body the caller has finished reading
    pub fn record_completion(&mut self) {
        self.pacer.record_completion();
    }

    /// Requests actually put on the wire
    pub fn requests_sent(&self) -> u64 {
        self.requests_sent
    }

    pub fn backoff(&self) -> &ThrottleBackoff {
        &self.backoff
    }

    /// Get a reference to the underlying HTTP client
    pub fn client(&self) -> &Client {
        &self.client
    }
}
