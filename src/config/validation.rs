use crate::config::types::{ApiConfig, Config, CrawlConfig, JobsConfig, RetryConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_api_config(&config.api)?;
    validate_crawl_config(&config.crawl)?;
    validate_retry_config(&config.retry)?;
    validate_jobs_config(&config.jobs)?;
    Ok(())
}

/// Validates API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            url.scheme()
        )));
    }

    if config.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "timeout-secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates segmentation settings
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    if config.min_window < 1 {
        return Err(ConfigError::Validation(
            "min-window must be >= 1".to_string(),
        ));
    }

    if config.min_window > config.default_window || config.default_window > config.max_window {
        return Err(ConfigError::Validation(format!(
            "windows must satisfy min <= default <= max, got {} / {} / {}",
            config.min_window, config.default_window, config.max_window
        )));
    }

    if config.grow_after < 1 {
        return Err(ConfigError::Validation(
            "grow-after must be >= 1".to_string(),
        ));
    }

    if !(config.grow_factor > 1.0) {
        return Err(ConfigError::Validation(format!(
            "grow-factor must be greater than 1.0, got {}",
            config.grow_factor
        )));
    }

    if config.max_records_per_query < 1 {
        return Err(ConfigError::Validation(
            "max-records-per-query must be >= 1".to_string(),
        ));
    }

    if config.default_page_size < 1 || config.default_page_size > config.max_records_per_query {
        return Err(ConfigError::Validation(format!(
            "default-page-size must be between 1 and {}, got {}",
            config.max_records_per_query, config.default_page_size
        )));
    }

    if config.segment_log_size < 1 {
        return Err(ConfigError::Validation(
            "segment-log-size must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates retry configuration
fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(
            "max-attempts must be >= 1".to_string(),
        ));
    }

    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "base-delay-ms ({}) cannot exceed max-delay-ms ({})",
            config.base_delay_ms, config.max_delay_ms
        )));
    }

    if !(0.0..=1.0).contains(&config.jitter) {
        return Err(ConfigError::Validation(format!(
            "jitter must be between 0.0 and 1.0, got {}",
            config.jitter
        )));
    }

    Ok(())
}

/// Validates job registry configuration
fn validate_jobs_config(config: &JobsConfig) -> Result<(), ConfigError> {
    if config.max_retained < 1 {
        return Err(ConfigError::Validation(
            "max-retained must be >= 1".to_string(),
        ));
    }

    Ok(())
}
