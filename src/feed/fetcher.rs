use futures::StreamExt;
use reqwest::header::HeaderMap;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::HttpConfig;
use crate::util::{check_url, UrlValidationError};

/// Errors that can occur while retrieving source content.
///
/// These errors cover the full lifecycle of a fetch: URL policy, network
/// issues, HTTP errors and oversized or truncated bodies.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL failed the fetch policy (bad scheme, internal host)
    #[error("Refusing to fetch: {0}")]
    InvalidUrl(#[from] UrlValidationError),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Knobs for a [`Fetcher`], usually taken from `[http]` in the config.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub max_retries: u32,
    /// First backoff delay; doubles on each retry.
    pub backoff_base: Duration,
    pub max_body_bytes: usize,
    pub allow_private_hosts: bool,
}

impl From<&HttpConfig> for FetchSettings {
    fn from(http: &HttpConfig) -> Self {
        Self {
            timeout: http.timeout(),
            max_retries: http.max_retries,
            backoff_base: http.backoff_base(),
            max_body_bytes: http.max_body_bytes,
            allow_private_hosts: http.allow_private_hosts,
        }
    }
}

/// HTTP retrieval with timeout, bounded retries and a body size cap.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl Fetcher {
    pub fn new(client: reqwest::Client, settings: FetchSettings) -> Self {
        Self { client, settings }
    }

    /// Builds a client carrying the configured `User-Agent`.
    pub fn from_config(http: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(http.user_agent.as_str())
            .build()?;
        Ok(Self::new(client, FetchSettings::from(http)))
    }

    pub async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        self.fetch_with(url, &[], HeaderMap::new()).await
    }

    /// Fetches `url` with extra query parameters and headers.
    ///
    /// # Behavior
    ///
    /// - Each attempt is bounded by the configured timeout
    /// - 429, 5xx and truncated bodies are retried with exponential backoff
    ///   (`backoff_base * 2^attempt`) up to `max_retries` times
    /// - Other non-2xx statuses fail immediately with [`FetchError::HttpStatus`]
    /// - Bodies larger than `max_body_bytes` fail with [`FetchError::ResponseTooLarge`]
    pub async fn fetch_with(
        &self,
        url: &Url,
        query: &[(&str, &str)],
        headers: HeaderMap,
    ) -> Result<Vec<u8>, FetchError> {
        check_url(url, self.settings.allow_private_hosts)?;

        let mut target = url.clone();
        if !query.is_empty() {
            target.query_pairs_mut().extend_pairs(query.iter());
        }

        let mut retry_count = 0;

        loop {
            let request = self.client.get(target.clone()).headers(headers.clone());

            let response = tokio::time::timeout(self.settings.timeout, request.send())
                .await
                .map_err(|_| FetchError::Timeout)?
                .map_err(FetchError::Network)?;

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if retry_count >= self.settings.max_retries {
                    return Err(FetchError::RateLimited(self.settings.max_retries));
                }
                let delay = self.backoff(retry_count);
                tracing::warn!(
                    url = %url,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if status.is_server_error() {
                if retry_count >= self.settings.max_retries {
                    return Err(FetchError::HttpStatus(status.as_u16()));
                }
                let delay = self.backoff(retry_count);
                tracing::warn!(
                    url = %url,
                    status = %status,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            // 4xx errors fail immediately
            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            match tokio::time::timeout(
                self.settings.timeout,
                read_limited_bytes(response, self.settings.max_body_bytes),
            )
            .await
            .map_err(|_| FetchError::Timeout)?
            {
                Ok(bytes) => {
                    tracing::debug!(url = %url, bytes = bytes.len(), "Fetched");
                    return Ok(bytes);
                }
                Err(FetchError::IncompleteResponse { expected, received }) => {
                    // Retry truncated downloads
                    if retry_count >= self.settings.max_retries {
                        return Err(FetchError::IncompleteResponse { expected, received });
                    }
                    let delay = self.backoff(retry_count);
                    tracing::debug!(
                        url = %url,
                        expected = expected,
                        received = received,
                        attempt = retry_count + 1,
                        "Retrying incomplete download"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, retry_count: u32) -> Duration {
        self.settings
            .backoff_base
            .saturating_mul(2u32.saturating_pow(retry_count))
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            // A connection dropped before Content-Length bytes arrived.
            Err(_) if expected_length.is_some_and(|expected| (bytes.len() as u64) < expected) => {
                return Err(FetchError::IncompleteResponse {
                    expected: expected_length.unwrap_or_default(),
                    received: bytes.len(),
                });
            }
            Err(e) => return Err(FetchError::Network(e)),
        };
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
