//! Cluster-Sweep: an exhaustive crawler for spatial-clustering map APIs
//!
//! This crate walks a hierarchical cluster API until every leaf marker has been
//! discovered, then fetches one detail document per leaf. Requests are retried
//! until they succeed, optionally through a rotating pool of HTTP proxies.

pub mod config;
pub mod crawler;
pub mod model;
pub mod output;
pub mod proxy;

use thiserror::Error;

/// Main error type for Cluster-Sweep operations
///
/// Failed requests never surface here: the request executor retries them.
/// What remains is setup, output, and the optional stop conditions.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("Gave up on {url} after {attempts} attempts")]
    RetriesExhausted { url: String, attempts: u32 },
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

    #[error("Invalid proxy entry: {0}")]
    InvalidProxy(String),
}

/// Result type alias for Cluster-Sweep operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Aggregator, Crawler, RequestExecutor, ResultSnapshot, TaskPool, WorkQueue};
pub use model::{ClusterKey, ClusterNode, DetailDocument, LeafEntity, ProxyDescriptor};
pub use proxy::{ProxyPolicy, ProxyRotator};
