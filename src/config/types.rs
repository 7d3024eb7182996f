use crate::model::ProxyDescriptor;
use crate::proxy::ProxyPolicy;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Cluster-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub endpoints: EndpointConfig,
    pub seed: SeedConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    pub output: OutputConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of concurrent worker chains per phase
    #[serde(rename = "concurrency-limit", default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Fixed delay between attempts of a failed request (milliseconds)
    #[serde(rename = "retry-delay", default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Total timeout of a single HTTP attempt (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// Attempts before giving up on a request; 0 retries forever
    #[serde(rename = "max-attempts", default)]
    pub max_attempts: u32,
}

impl CrawlerConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// The attempt cap, if one is configured
    pub fn max_attempts(&self) -> Option<u32> {
        (self.max_attempts > 0).then_some(self.max_attempts)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            retry_delay: default_retry_delay(),
            request_timeout: default_request_timeout(),
            max_attempts: 0,
        }
    }
}

fn default_concurrency_limit() -> usize {
    100
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_request_timeout() -> u64 {
    180
}

/// User agent sent with every request
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    pub value: String,
}

/// API endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Cluster expansion endpoint (POST, JSON array of cluster keys)
    pub cluster: String,

    /// Base of the detail endpoint; documents live at `<detail>/<key>.json`
    pub detail: String,

    /// Status codes accepted from the cluster endpoint
    #[serde(rename = "cluster-success-statuses", default = "default_success_statuses")]
    pub cluster_success_statuses: Vec<u16>,
}

fn default_success_statuses() -> Vec<u16> {
    vec![200]
}

/// Where the traversal starts
#[derive(Debug, Clone, Deserialize)]
pub struct SeedConfig {
    /// Root cluster keys
    #[serde(rename = "root-keys")]
    pub root_keys: Vec<String>,
}

/// Proxy pool configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub policy: ProxyPolicy,

    /// Reject unusable pool entries when loading instead of at run time
    #[serde(default)]
    pub strict: bool,

    #[serde(default)]
    pub pool: Vec<ProxyDescriptor>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path of the JSON array of detail documents
    #[serde(rename = "json-path")]
    pub json_path: String,

    /// Optional SQLite database receiving the full result set
    #[serde(rename = "database-path", default)]
    pub database_path: Option<String>,
}
