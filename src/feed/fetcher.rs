use crate::util::{strip_control_chars, truncate_chars, validate_url};
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Default cap on a feed response body.
pub const DEFAULT_MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
/// Default per-request transport timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on how much of a failed response is read for diagnostics.
const MAX_DIAGNOSTIC_BYTES: usize = 4 * 1024;
/// Characters of the diagnostic body that make it into the log line.
const MAX_DIAGNOSTIC_CHARS: usize = 512;

/// Errors that can occur while fetching a feed resource.
///
/// None of these are retried; a failure aborts the current read.
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL was not an absolute http(s) URL; no request was issued
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {status}")]
    HttpStatus { status: u16 },
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl FetchError {
    /// HTTP status for [`FetchError::HttpStatus`], `None` for transport failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status } => Some(*status),
            _ => None,
        }
    }
}

/// Options for building a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    /// Skip TLS certificate verification. Never on by default.
    pub insecure_tls: bool,
    pub request_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            insecure_tls: false,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_FEED_SIZE,
        }
    }
}

/// Issues single-attempt GET requests and returns raw response bodies.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    request_timeout: Duration,
    max_body_bytes: usize,
}

impl Fetcher {
    /// Builds a fetcher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Network`] if the TLS backend cannot be initialised.
    pub fn new(options: FetcherOptions) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if options.insecure_tls {
            tracing::warn!("TLS certificate verification is DISABLED for feed requests");
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build()?;
        Ok(Self::with_client(client, &options))
    }

    /// Wraps an existing client. `options.insecure_tls` is ignored here;
    /// certificate handling belongs to whoever built `client`.
    pub fn with_client(client: reqwest::Client, options: &FetcherOptions) -> Self {
        Self {
            client,
            request_timeout: options.request_timeout,
            max_body_bytes: options.max_body_bytes,
        }
    }

    /// Fetches `url` with exactly one GET and returns the body.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - not an absolute http(s) URL
    /// - [`FetchError::Network`] - DNS, connect or TLS failure
    /// - [`FetchError::Timeout`] - no response within the request timeout
    /// - [`FetchError::HttpStatus`] - non-2xx response (body logged, not returned)
    /// - [`FetchError::ResponseTooLarge`] / [`FetchError::IncompleteResponse`]
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let url = validate_url(url).map_err(|e| FetchError::InvalidUrl(e.to_string()))?;

        tracing::info!(url = %url, "GET");
        let response = tokio::time::timeout(self.request_timeout, self.client.get(url.clone()).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();
        if !status.is_success() {
            // Diagnostic only: a failed or stalled read here must not replace the status.
            let diagnostic = tokio::time::timeout(
                self.request_timeout,
                read_limited_bytes(response, MAX_DIAGNOSTIC_BYTES),
            )
            .await
            .unwrap_or(Err(FetchError::Timeout));
            match diagnostic {
                Ok(body) => {
                    let text = String::from_utf8_lossy(&body);
                    let text = strip_control_chars(&text);
                    tracing::warn!(
                        url = %url,
                        status = status.as_u16(),
                        body = %truncate_chars(&text, MAX_DIAGNOSTIC_CHARS),
                        "Error reading feed"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        url = %url,
                        status = status.as_u16(),
                        error = %e,
                        "Error reading feed (diagnostic body unavailable)"
                    );
                }
            }
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let bytes = tokio::time::timeout(
            self.request_timeout,
            read_limited_bytes(response, self.max_body_bytes),
        )
        .await
        .map_err(|_| FetchError::Timeout)??;

        tracing::debug!(url = %url, bytes = bytes.len(), "Fetched resource");
        Ok(bytes)
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
        let chunk = chunk.map_err(FetchError::Network)?;
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
