use crate::config::types::{
    Config, CrawlerConfig, EndpointConfig, OutputConfig, ProxyConfig, SeedConfig,
    UserAgentConfig,
};
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Upper bound on worker chains per phase
const MAX_CONCURRENCY_LIMIT: usize = 1000;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_endpoints(&config.endpoints)?;
    validate_seed(&config.seed)?;
    validate_proxy_config(&config.proxy)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.concurrency_limit < 1 || config.concurrency_limit > MAX_CONCURRENCY_LIMIT {
        return Err(ConfigError::Validation(format!(
            "concurrency_limit must be between 1 and {}, got {}",
            MAX_CONCURRENCY_LIMIT, config.concurrency_limit
        )));
    }

    if config.retry_delay < 1 {
        return Err(ConfigError::Validation(format!(
            "retry_delay must be >= 1ms, got {}ms",
            config.retry_delay
        )));
    }

    if config.request_timeout < 1 {
        return Err(ConfigError::Validation(format!(
            "request_timeout must be >= 1s, got {}s",
            config.request_timeout
        )));
    }

    Ok(())
}

/// Validates user agent configuration
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.value.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user agent cannot be empty".to_string(),
        ));
    }

    if config.value.chars().any(|c| c.is_control()) {
        return Err(ConfigError::Validation(
            "user agent cannot contain control characters".to_string(),
        ));
    }

    Ok(())
}

/// Validates the API endpoints
fn validate_endpoints(config: &EndpointConfig) -> Result<(), ConfigError> {
    validate_http_url("cluster endpoint", &config.cluster)?;
    validate_http_url("detail endpoint", &config.detail)?;

    if config.cluster_success_statuses.is_empty() {
        return Err(ConfigError::Validation(
            "cluster_success_statuses cannot be empty".to_string(),
        ));
    }

    for status in &config.cluster_success_statuses {
        if !(100..=599).contains(status) {
            return Err(ConfigError::Validation(format!(
                "cluster_success_statuses contains invalid HTTP status {}",
                status
            )));
        }
    }

    Ok(())
}

/// Validates that a URL parses and uses an HTTP(S) scheme
fn validate_http_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            name, value
        )));
    }

    Ok(())
}

/// Validates the seed cluster keys
fn validate_seed(config: &SeedConfig) -> Result<(), ConfigError> {
    if config.root_keys.is_empty() {
        return Err(ConfigError::Validation(
            "at least one root cluster key is required".to_string(),
        ));
    }

    if config.root_keys.iter().any(|key| key.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "root cluster keys cannot be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    if let Some(duplicate) = config.root_keys.iter().find(|key| !seen.insert(key.as_str())) {
        return Err(ConfigError::Validation(format!(
            "root cluster key '{}' is listed more than once",
            duplicate
        )));
    }

    Ok(())
}

/// Validates proxy entries when strict mode asks for it
///
/// Outside strict mode malformed entries are accepted here; the rotator
/// decides at startup whether proxying can be used.
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if !config.strict {
        return Ok(());
    }

    for (index, proxy) in config.pool.iter().enumerate() {
        if proxy.host.trim().is_empty() {
            return Err(ConfigError::InvalidProxy(format!(
                "proxy #{} has an empty host",
                index + 1
            )));
        }

        if proxy.port_number().is_none() {
            return Err(ConfigError::InvalidProxy(format!(
                "proxy #{} ({}) has an invalid port '{}'",
                index + 1,
                proxy.host,
                proxy.port
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.json_path.is_empty() {
        return Err(ConfigError::Validation(
            "json_path cannot be empty".to_string(),
        ));
    }

    if config.database_path.as_deref() == Some("") {
        return Err(ConfigError::Validation(
            "database_path cannot be empty when set".to_string(),
        ));
    }

    Ok(())
}
