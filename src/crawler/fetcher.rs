//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with a per-session user agent
//! - Referer propagation
//! - Bounded retry with exponential backoff for transient failures
//! - Error classification

use crate::config::FetcherConfig;
use crate::{FetchError, FetchResult};
use async_trait::async_trait;
use reqwest::header::REFERER;
use reqwest::Client;
use std::time::Duration;

/// Capability for turning a URL into page content
///
/// Implementations own their retry policy: a returned error means retries
/// are exhausted and the caller should not retry on its own.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`, sending `referer` when given
    async fn fetch(&self, url: &str, referer: Option<&str>) -> FetchResult<String>;
}

/// reqwest-backed fetcher with its own connection pool
pub struct HttpFetcher {
    client: Client,
    retries: u32,
    backoff: Duration,
    retry_statuses: Vec<u16>,
    default_referer: Option<String>,
}

impl HttpFetcher {
    /// Creates a fetcher for the given session slot
    ///
    /// The user agent is picked from the configured pool by `slot`, so
    /// consecutive workers present different agents.
    ///
    /// # Arguments
    ///
    /// * `config` - The fetcher configuration
    /// * `slot` - Session slot (worker id) used to pick a user agent
    ///
    /// # Returns
    ///
    /// * `Ok(HttpFetcher)` - Successfully built fetcher
    /// * `Err(reqwest::Error)` - Failed to build the HTTP client
    pub fn new(config: &FetcherConfig, slot: usize) -> Result<Self, reqwest::Error> {
        let mut builder = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            .gzip(true)
            .brotli(true);

        if !config.user_agents.is_empty() {
            let user_agent = &config.user_agents[slot % config.user_agents.len()];
            builder = builder.user_agent(user_agent.as_str());
        }

        Ok(Self {
            client: builder.build()?,
            retries: config.retries,
            backoff: config.backoff(),
            retry_statuses: config.retry_statuses.clone(),
            default_referer: config.referer.clone(),
        })
    }

    fn is_retryable_status(&self, status: u16) -> bool {
        self.retry_statuses.contains(&status)
    }

    /// Delay before the attempt following `attempt` (0-based)
    fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    /// Fetches a URL with retry logic
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 2xx | Return body |
    /// | Retryable status (429, 5xx by default) | Retry with backoff |
    /// | Other error status (404, 403, ...) | Fail immediately |
    /// | Timeout | Retry with backoff |
    /// | Connection error | Retry with backoff |
    ///
    /// After `retries` extra attempts the last failure is returned.
    async fn fetch(&self, url: &str, referer: Option<&str>) -> FetchResult<String> {
        let referer = referer.or(self.default_referer.as_deref());
        let max_attempts = self.retries + 1;
        let mut attempt = 0;

        loop {
            let mut request = self.client.get(url);
            if let Some(referer) = referer {
                request = request.header(REFERER, referer);
            }

            let failure = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        match response.text().await {
                            Ok(body) => return Ok(body),
                            Err(e) => FetchError::Network {
                                url: url.to_string(),
                                message: e.to_string(),
                            },
                        }
                    } else {
                        let failure = FetchError::Status {
                            url: url.to_string(),
                            status: status.as_u16(),
                            attempts: attempt + 1,
                        };
                        if !self.is_retryable_status(status.as_u16()) {
                            tracing::debug!("Non-retryable HTTP {} for {}", status, url);
                            return Err(failure);
                        }
                        failure
                    }
                }
                Err(e) if e.is_timeout() => FetchError::Timeout {
                    url: url.to_string(),
                    attempts: attempt + 1,
                },
                Err(e) => FetchError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                },
            };

            attempt += 1;
            if attempt >= max_attempts {
                tracing::warn!("HTTP fetch failed for {}: {}", url, failure);
                return Err(failure);
            }

            let delay = self.backoff_for(attempt - 1);
            tracing::debug!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempt,
                max_attempts,
                url,
                failure,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}
