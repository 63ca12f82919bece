use crate::config::types::{
    Config, CrawlerConfig, FingerprintConfig, OutputConfig, SiteConfig, UserAgentConfig,
};
use crate::crawler::seed_alphabet;
use crate::ConfigError;
use url::Url;

/// Largest accepted sampling window (bytes)
const MAX_WINDOW_SIZE: u64 = 1024 * 1024;

/// Largest accepted whole-file sample count
const MAX_SAMPLE_COUNT: u64 = 64;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_site_config(&config.site)?;
    validate_fingerprint_config(&config.fingerprint)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_concurrent_requests < 1 || config.max_concurrent_requests > 64 {
        return Err(ConfigError::Validation(format!(
            "max_concurrent_requests must be between 1 and 64, got {}",
            config.max_concurrent_requests
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.chain_stall_timeout_secs < config.request_timeout_secs {
        return Err(ConfigError::Validation(format!(
            "chain_stall_timeout_secs ({}) must not be shorter than request_timeout_secs ({})",
            config.chain_stall_timeout_secs, config.request_timeout_secs
        )));
    }

    if let Some(seeds) = &config.seeds {
        validate_seeds(seeds)?;
    }

    Ok(())
}

/// Validates a seed subset: non-empty, no repeats, alphabet symbols only
fn validate_seeds(seeds: &str) -> Result<(), ConfigError> {
    if seeds.is_empty() {
        return Err(ConfigError::Validation("seeds cannot be empty".to_string()));
    }

    let alphabet = seed_alphabet();
    let mut seen = Vec::new();
    for symbol in seeds.chars() {
        if !alphabet.contains(&symbol) {
            return Err(ConfigError::Validation(format!(
                "seed '{}' is not part of the search alphabet",
                symbol
            )));
        }
        if seen.contains(&symbol) {
            return Err(ConfigError::Validation(format!(
                "seed '{}' is listed more than once",
                symbol
            )));
        }
        seen.push(symbol);
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    // Validate crawler name: non-empty, alphanumeric + hyphens only
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

/// Validates the site layout
fn validate_site_config(config: &SiteConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url must use http or https, got '{}'",
            config.base_url
        )));
    }

    if !config.results_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "results_path must start with '/', got '{}'",
            config.results_path
        )));
    }

    if config.page_size == 0 {
        return Err(ConfigError::Validation(
            "page_size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates sampling parameters
fn validate_fingerprint_config(config: &FingerprintConfig) -> Result<(), ConfigError> {
    if config.window_size == 0 || config.window_size > MAX_WINDOW_SIZE {
        return Err(ConfigError::Validation(format!(
            "window_size must be between 1 and {}, got {}",
            MAX_WINDOW_SIZE, config.window_size
        )));
    }

    if config.sample_count > MAX_SAMPLE_COUNT {
        return Err(ConfigError::Validation(format!(
            "sample_count must be <= {}, got {}",
            MAX_SAMPLE_COUNT, config.sample_count
        )));
    }

    if config.sample_count < 3 {
        return Err(ConfigError::Validation(format!(
            "sample_count must be >= 3 so sampled windows never run past the file, got {}",
            config.sample_count
        )));
    }

    if config.accept_encoding.trim().is_empty() {
        return Err(ConfigError::Validation(
            "accept_encoding cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    if email.is_empty() {
        return Err(ConfigError::Validation(
            "contact_email cannot be empty".to_string(),
        ));
    }

    // Basic email format check: must contain @ and have text on both sides
    let parts: Vec<&str> = email.split('@').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    if !parts[1].contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email domain: '{}'",
            email
        )));
    }

    Ok(())
}
