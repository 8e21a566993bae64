//! Open Library books API client.
//!
//! Each attempt is bounded by a connect timeout and a response timeout. Transient
//! failures (timeouts, connection errors, 5xx) are retried according to the
//! configured `RetryPolicy`; anything else, 4xx included, fails immediately.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use shelfsync_catalog::{FetchError, MetadataClient};
use shelfsync_core::{BookMetadata, Isbn};

use super::payload::parse_books_response;
use super::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "https://openlibrary.org";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenLibraryConfig {
    /// Scheme + host (+ optional path prefix), without the `/api/books` suffix.
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Upper bound for a whole attempt: sending the request and reading the body.
    pub response_timeout: Duration,
    pub retry: RetryPolicy,
    /// Extra headers sent with every request (e.g. API credentials).
    pub headers: Vec<(String, String)>,
}

impl Default for OpenLibraryConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            connect_timeout: Duration::from_secs(2),
            response_timeout: Duration::from_secs(2),
            retry: RetryPolicy::default(),
            headers: Vec::new(),
        }
    }
}

/// Outcome of a single HTTP attempt.
enum Attempt {
    Done(Result<BookMetadata, FetchError>),
    Transient(String),
}

#[derive(Debug, Clone)]
pub struct OpenLibraryClient {
    http: reqwest::Client,
    base_url: String,
    response_timeout: Duration,
    retry: RetryPolicy,
}

impl OpenLibraryClient {
    pub fn new(config: OpenLibraryConfig) -> Result<Self, FetchError> {
        reqwest::Url::parse(&config.base_url).map_err(|e| {
            FetchError::InvalidRequest(format!("invalid base url '{}': {}", config.base_url, e))
        })?;

        let headers = build_headers(&config.headers)?;

        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::InvalidRequest(format!("http client: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            response_timeout: config.response_timeout,
            retry: config.retry,
        })
    }

    /// Full request URL for one ISBN.
    ///
    /// Built by hand: the `bibkeys` value must keep its literal `:`.
    pub fn books_url(&self, isbn: &Isbn) -> String {
        format!(
            "{}/api/books?jscmd=data&format=json&bibkeys=ISBN:{}",
            self.base_url, isbn
        )
    }

    async fn attempt(&self, isbn: &Isbn, url: &str) -> Attempt {
        let response = match self
            .http
            .get(url)
            .timeout(self.response_timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_builder() => {
                return Attempt::Done(Err(FetchError::InvalidRequest(e.to_string())));
            }
            Err(e) => return Attempt::Transient(describe_transport_error(&e)),
        };

        let status = response.status();
        if is_transient_status(status) {
            return Attempt::Transient(format!("server responded with {}", status));
        }
        if !status.is_success() {
            return Attempt::Done(Err(FetchError::Rejected {
                status: status.as_u16(),
            }));
        }

        match response.bytes().await {
            Ok(body) => Attempt::Done(parse_books_response(isbn, &body)),
            Err(e) => Attempt::Transient(describe_transport_error(&e)),
        }
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        format!("request failed: {}", e)
    }
}

fn build_headers(pairs: &[(String, String)]) -> Result<HeaderMap, FetchError> {
    let mut headers = HeaderMap::with_capacity(pairs.len());
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| FetchError::InvalidRequest(format!("header name '{}': {}", name, e)))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| FetchError::InvalidRequest(format!("header value for '{}': {}", name, e)))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

#[async_trait]
impl MetadataClient for OpenLibraryClient {
    #[instrument(skip(self), fields(isbn = %isbn), err)]
    async fn fetch(&self, isbn: &Isbn) -> Result<BookMetadata, FetchError> {
        let url = self.books_url(isbn);
        let mut attempt = 0;

        loop {
            attempt += 1;
            debug!(attempt, %url, "requesting book metadata");

            match self.attempt(isbn, &url).await {
                Attempt::Done(result) => return result,
                Attempt::Transient(error) if self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay;
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "metadata request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Attempt::Transient(error) => {
                    return Err(FetchError::TransientExhausted {
                        attempts: attempt,
                        last_error: error,
                    });
                }
            }
        }
    }
}
