//! HTTP transport
//!
//! This module performs single HTTP attempts for the request executor:
//! - Building HTTP clients with the configured user agent and timeout
//! - One client per proxy, built lazily and reused
//! - Classifying transport failures
//!
//! A transport never retries; that is the executor's job.

use crate::model::ProxyDescriptor;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// A request as it goes over the wire
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: String,

    /// JSON payload, sent with `Content-Type: application/json`
    pub body: Option<serde_json::Value>,
}

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

/// Failure of a single HTTP attempt
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request timeout for {url}")]
    Timeout { url: String },

    #[error("Connection failed for {url}: {message}")]
    Connect { url: String, message: String },

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("Cannot use proxy {proxy}: {message}")]
    Proxy { proxy: String, message: String },

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Transport failure: {0}")]
    Other(String),
}

impl TransportError {
    fn classify(url: &str, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout {
                url: url.to_string(),
            }
        } else if error.is_connect() {
            TransportError::Connect {
                url: url.to_string(),
                message: error.to_string(),
            }
        } else {
            TransportError::Http {
                url: url.to_string(),
                source: error,
            }
        }
    }
}

/// Sends one HTTP request, optionally through a proxy
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &OutboundRequest,
        proxy: Option<&ProxyDescriptor>,
    ) -> Result<RawResponse, TransportError>;
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `user_agent` - Value of the `User-Agent` header
/// * `timeout` - Total timeout of one request, connect to last body byte
/// * `proxy` - Proxy to route every request of this client through
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client or proxy
///
/// # Example
///
/// ```no_run
/// use cluster_sweep::crawler::build_http_client;
/// use std::time::Duration;
///
/// let client = build_http_client("Mozilla/5.0", Duration::from_secs(180), None).unwrap();
/// ```
pub fn build_http_client(
    user_agent: &str,
    timeout: Duration,
    proxy: Option<&ProxyDescriptor>,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .gzip(true)
        .brotli(true);

    if let Some(descriptor) = proxy {
        let mut proxy = reqwest::Proxy::all(descriptor.proxy_url())?;
        if let Some((user, password)) = descriptor.credentials() {
            proxy = proxy.basic_auth(user, password);
        }
        builder = builder.proxy(proxy);
    }

    builder.build()
}

/// `Transport` backed by reqwest
pub struct ReqwestTransport {
    user_agent: String,
    timeout: Duration,
    direct: Client,
    proxied: Mutex<HashMap<ProxyDescriptor, Client>>,
}

impl ReqwestTransport {
    /// Creates a transport and its direct (unproxied) client
    pub fn new(user_agent: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let user_agent = user_agent.into();
        let direct = build_http_client(&user_agent, timeout, None)?;

        Ok(Self {
            user_agent,
            timeout,
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the client for a proxy, building it on first use
    fn client_for(&self, proxy: Option<&ProxyDescriptor>) -> Result<Client, TransportError> {
        let Some(descriptor) = proxy else {
            return Ok(self.direct.clone());
        };

        if !descriptor.is_usable() {
            return Err(TransportError::Proxy {
                proxy: descriptor.to_string(),
                message: "host or port is malformed".to_string(),
            });
        }

        let mut clients = self.proxied.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(descriptor) {
            return Ok(client.clone());
        }

        let client = build_http_client(&self.user_agent, self.timeout, Some(descriptor)).map_err(
            |e| TransportError::Proxy {
                proxy: descriptor.to_string(),
                message: e.to_string(),
            },
        )?;
        tracing::debug!("Built HTTP client for proxy {}", descriptor);
        clients.insert(descriptor.clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        request: &OutboundRequest,
        proxy: Option<&ProxyDescriptor>,
    ) -> Result<RawResponse, TransportError> {
        let client = self.client_for(proxy)?;

        let mut builder = client.request(request.method.clone(), &request.url);
        if let Some(body) = &request.body {
            builder = builder
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::to_vec(body)?);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::classify(&request.url, e))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::classify(&request.url, e))?;

        Ok(RawResponse { status, body })
    }
}
