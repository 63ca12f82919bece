//! rceth-harvest: a drug-registry catalog harvester
//!
//! This crate crawls the public drug registry at rceth.by, assembles one
//! structured record per registered drug and fingerprints every attached
//! document by sampling a few byte ranges instead of downloading it whole.

pub mod config;
pub mod crawler;
pub mod fingerprint;
pub mod output;
pub mod record;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for harvest operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("HTML parse error for {url}: {message}")]
    HtmlParse { url: String, message: String },

    #[error("Malformed state blob: {0}")]
    MalformedStateBlob(String),

    #[error("Missing or unusable Content-Length for {url}")]
    MissingContentLength { url: String },

    #[error("Chain stalled on lineage '{lineage}': {reason}")]
    ChainStall { lineage: char, reason: String },

    #[error("Crawl finished with {outstanding} records outstanding")]
    IncompleteCrawl { outstanding: i64 },

    #[error("Invalid transition for record {record}: {from} -> {to}")]
    InvalidTransition {
        record: String,
        from: state::RecordStage,
        to: state::RecordStage,
    },

    #[error("Unexpected {fetch} for record {record}")]
    UnexpectedFetch { record: String, fetch: String },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CrawlError {
    /// Returns true for failures worth another attempt
    ///
    /// Timeouts, connection failures, server errors and rate limiting are
    /// transient; everything else is permanent.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Http { source, .. } => source.is_timeout() || source.is_connect(),
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for harvest operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use record::{DrugRecord, FileRecord, Sample};
pub use state::{ProgressTracker, RecordAssembly, RecordStage};
