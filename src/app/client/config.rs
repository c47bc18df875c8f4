//! HTTP client configuration and building logic
//!
//! This module handles the configuration and construction of the single
//! persistent HTTP client used against the archive origin.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, REFERER};
use reqwest::{redirect, Client};
use url::Url;

use crate::app::enumerator::default_base_url;
use crate::constants::{http, limits, origin};
use crate::errors::{ConfigError, ConfigResult, TransferError, TransferResult};

/// Configuration for the paced transport
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin directory holding the archives
    pub base_url: Url,
    /// Minimum delay between the end of one request and the start of the next
    pub min_delay: Duration,
    /// Attempts per request on throttling or transient network failures
    pub max_attempts: u32,
    /// Cap on the throttle backoff multiplier
    pub backoff_ceiling: u32,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Maximum wait for response headers
    pub response_timeout: Duration,
    /// TCP keep-alive settings
    pub tcp_keepalive: Option<Duration>,
    /// Connection pool idle timeout
    pub pool_idle_timeout: Option<Duration>,
    /// User agent presented to the origin
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
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

impl ClientConfig {
    /// Validate configuration values
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.max_attempts".to_string(),
                value: self.max_attempts.to_string(),
                reason: "At least one attempt is required".to_string(),
            });
        }

        if self.backoff_ceiling == 0 {
            return Err(ConfigError::InvalidValue {
                field: "client.backoff_ceiling".to_string(),
                value: self.backoff_ceiling.to_string(),
                reason: "The multiplier ceiling must be at least 1".to_string(),
            });
        }

        if !self.base_url.path().ends_with('/') {
            return Err(ConfigError::InvalidValue {
                field: "client.base_url".to_string(),
                value: self.base_url.to_string(),
                reason: "The origin URL must be a directory ending in '/'".to_string(),
            });
        }

        Ok(())
    }

    /// Builds the HTTP client with the specified configuration
    ///
    /// One client, one small pool: every request reuses the same keep-alive
    /// connection and presents the same identity to the origin.
    pub fn build_http_client(&self) -> TransferResult<Client> {
        let mut headers = HeaderMap::new();
        headers.insert(REFERER, HeaderValue::from_static(origin::REFERER));
        headers.insert(ACCEPT, HeaderValue::from_static(http::ACCEPT));
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static(http::ACCEPT_LANGUAGE),
        );

        let mut client_builder = Client::builder()
            .default_headers(headers)
            .user_agent(self.user_agent.as_str())
            .connect_timeout(self.connect_timeout)
            .redirect(redirect::Policy::limited(10))
            .pool_max_idle_per_host(1);

        // Configure TCP keep-alive if specified
        if let Some(keepalive) = self.tcp_keepalive {
            client_builder = client_builder.tcp_keepalive(keepalive);
        }

        // Configure connection pool idle timeout
        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder = client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build().map_err(TransferError::Http)
    }
}
