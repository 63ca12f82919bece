use serde::Deserialize;

/// Main configuration structure for rceth-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub fingerprint: FingerprintConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of requests in flight at once
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long a chain task may run before the next one is released anyway (seconds)
    #[serde(
        rename = "chain-stall-timeout-secs",
        default = "default_chain_stall_timeout"
    )]
    pub chain_stall_timeout_secs: u64,

    /// Retries for transient fetch failures
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Restricts the crawl to these seed symbols, in this order
    #[serde(default)]
    pub seeds: Option<String>,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Registry site layout
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// Path of the search results form endpoint
    #[serde(rename = "results-path", default = "default_results_path")]
    pub results_path: String,

    /// Items per listing page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            results_path: default_results_path(),
            page_size: default_page_size(),
        }
    }
}

/// Document sampling parameters
#[derive(Debug, Clone, Deserialize)]
pub struct FingerprintConfig {
    /// Bytes per sampled window
    #[serde(rename = "window-size", default = "default_window_size")]
    pub window_size: u64,

    /// Files up to `sample-count * window-size` bytes are fetched whole
    #[serde(rename = "sample-count", default = "default_sample_count")]
    pub sample_count: u64,

    /// Accept-Encoding sent with sample fetches
    #[serde(rename = "accept-encoding", default = "default_accept_encoding")]
    pub accept_encoding: String,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            sample_count: default_sample_count(),
            accept_encoding: default_accept_encoding(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Drop completed records instead of storing them
    #[serde(rename = "discard-items", default)]
    pub discard_items: bool,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_chain_stall_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    2
}

fn default_base_url() -> String {
    "https://rceth.by".to_string()
}

fn default_results_path() -> String {
    "/Refbank/reestr_lekarstvennih_sredstv/results".to_string()
}

fn default_page_size() -> u32 {
    100
}

fn default_window_size() -> u64 {
    512
}

fn default_sample_count() -> u64 {
    3
}

fn default_accept_encoding() -> String {
    "gzip, deflate, br".to_string()
}
