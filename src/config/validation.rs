use crate::config::types::{ApiConfig, Config, CrawlConfig, LoggingConfig};
use crate::{ConfigError, ConfigResult};
use url::Url;

/// Fastest spacing the remote API tolerates (3 calls per second)
pub const MIN_REQUEST_INTERVAL_MS: u64 = 334;

/// Validates the entire configuration
pub fn validate(config: &Config) -> ConfigResult<()> {
    validate_api_config(&config.api)?;
    validate_crawl_config(&config.crawl)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validates API access configuration
fn validate_api_config(config: &ApiConfig) -> ConfigResult<()> {
    if config.access_token.trim().is_empty() {
        return Err(ConfigError::Validation(
            "access-token cannot be empty".to_string(),
        ));
    }

    if config.version.trim().is_empty() {
        return Err(ConfigError::Validation(
            "version cannot be empty".to_string(),
        ));
    }

    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must use http or https, got '{}'",
            config.base_url
        )));
    }

    if config.request_interval < MIN_REQUEST_INTERVAL_MS {
        return Err(ConfigError::Validation(format!(
            "request-interval must be >= {}ms, got {}ms",
            MIN_REQUEST_INTERVAL_MS, config.request_interval
        )));
    }

    Ok(())
}

/// Validates crawl target configuration
fn validate_crawl_config(config: &CrawlConfig) -> ConfigResult<()> {
    if config.group_id == 0 {
        return Err(ConfigError::Validation(
            "group-id must be positive".to_string(),
        ));
    }

    if config.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "data-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the optional log sinks; disabled sinks are not checked
fn validate_logging_config(config: &LoggingConfig) -> ConfigResult<()> {
    if config.file.enabled && config.file.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "logging.file.path cannot be empty when the file sink is enabled".to_string(),
        ));
    }

    if config.alert.enabled {
        if config.alert.access_token.trim().is_empty() {
            return Err(ConfigError::Validation(
                "logging.alert.access-token cannot be empty when alerts are enabled".to_string(),
            ));
        }

        if config.alert.user_id == 0 {
            return Err(ConfigError::Validation(
                "logging.alert.user-id must be positive".to_string(),
            ));
        }
    }

    Ok(())
}
