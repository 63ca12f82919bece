//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Form POSTs for listing pages, GETs for detail pages and byte windows
//! - HEAD probes for document metadata
//! - Retry with exponential backoff for transient failures

use crate::config::{Config, UserAgentConfig};
use crate::{CrawlError, Result};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderName, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Client, Method};
use std::time::Duration;

/// Base delay before the first retry
const BASE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Upper bound of the exponential part of the retry delay
const MAX_RETRY_DELAY: Duration = Duration::from_secs(8);

/// Maximum jitter added to retry delays
const MAX_JITTER: Duration = Duration::from_millis(250);

/// A request the crawler wants issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: Vec<(HeaderName, String)>,

    /// URL-encoded form body
    pub form: Option<Vec<(String, String)>>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn head(url: impl Into<String>) -> Self {
        Self::new(Method::HEAD, url)
    }

    pub fn post_form(url: impl Into<String>, form: Vec<(String, String)>) -> Self {
        Self {
            form: Some(form),
            ..Self::new(Method::POST, url)
        }
    }

    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method,
            headers: Vec::new(),
            form: None,
        }
    }

    /// Adds a header, replacing an earlier value of the same name
    pub fn header(mut self, name: HeaderName, value: impl Into<String>) -> Self {
        self.headers.retain(|(existing, _)| *existing != name);
        self.headers.push((name, value.into()));
        self
    }

    pub fn header_value(&self, name: HeaderName) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A successful (2xx) response
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    /// Declared body length, if the server sent a parseable one
    pub fn content_length(&self) -> Option<i64> {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `config` - The user agent configuration
/// * `timeout` - Per-request timeout
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use rceth_harvest::config::UserAgentConfig;
/// use rceth_harvest::crawler::build_http_client;
/// use std::time::Duration;
///
/// let config = UserAgentConfig {
///     crawler_name: "RcethHarvest".to_string(),
///     crawler_version: "0.1".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config, Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(
    config: &UserAgentConfig,
    timeout: Duration,
) -> std::result::Result<Client, reqwest::Error> {
    // Format: CrawlerName/Version (+ContactURL; ContactEmail)
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
}

/// Issues requests with retry on transient failures
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(config: &Config) -> Result<Self> {
        let timeout = Duration::from_secs(config.crawler.request_timeout_secs);
        let client = build_http_client(&config.user_agent, timeout).map_err(|source| {
            CrawlError::Http {
                url: config.site.base_url.clone(),
                source,
            }
        })?;

        Ok(Self {
            client,
            max_retries: config.crawler.max_retries,
        })
    }

    /// Issues a request, retrying transient failures
    ///
    /// Non-2xx responses are errors; 429 and 5xx count as transient.
    pub async fn issue(&self, request: &FetchRequest) -> Result<FetchedResponse> {
        let mut attempt = 0;
        loop {
            match self.issue_once(request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    let delay = retry_delay(attempt);
                    tracing::debug!(
                        "Retrying {} {} in {:?} (attempt {}): {}",
                        request.method,
                        request.url,
                        delay,
                        attempt,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn issue_once(&self, request: &FetchRequest) -> Result<FetchedResponse> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.clone(), value.as_str());
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify(&request.url, e))?;

        let status = response.status();
        let url = response.url().to_string();
        if !status.is_success() {
            return Err(CrawlError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }

        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(&url, e))?
            .to_vec();

        tracing::trace!(
            "{} {} -> {} ({} bytes)",
            request.method,
            url,
            status,
            body.len()
        );

        Ok(FetchedResponse {
            url,
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

fn classify(url: &str, source: reqwest::Error) -> CrawlError {
    if source.is_timeout() {
        CrawlError::Timeout {
            url: url.to_string(),
        }
    } else {
        CrawlError::Http {
            url: url.to_string(),
            source,
        }
    }
}

/// Delay before retry `attempt` (1-based): `min(base * 2^(attempt-1), max) + jitter`
fn retry_delay(attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let backoff = BASE_RETRY_DELAY
        .saturating_mul(1u32 << exponent)
        .min(MAX_RETRY_DELAY);
    let jitter_ms = rand::thread_rng().gen_range(0..=MAX_JITTER.as_millis() as u64);
    backoff + Duration::from_millis(jitter_ms)
}
