//! Resilient request executor
//!
//! Issues one logical request and keeps retrying it until it succeeds:
//!
//! | Condition                       | Action                                  |
//! |---------------------------------|-----------------------------------------|
//! | Status in the success set       | Decode and return                       |
//! | Success status, undecodable     | Sleep, retry                            |
//! | HTTP 429 / 403                  | Draw a new proxy (if enabled), sleep, retry |
//! | Any other status                | Sleep, retry                            |
//! | Timeout / connection / I/O error| Sleep, retry                            |
//!
//! The delay between attempts is fixed and there is no attempt limit unless a
//! [`RetryPolicy`] sets one. A proxy is drawn before every attempt when
//! proxying is enabled. Callers only ever see success, cancellation, or an
//! exhausted attempt cap.

use crate::crawler::cancel::CancelSignal;
use crate::crawler::fetcher::{OutboundRequest, Transport};
use crate::proxy::ProxyRotator;
use crate::CrawlError;
use reqwest::Method;
use scraper::Html;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shape the response body is decoded into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Structured JSON
    Json,

    /// HTML/XML document
    Document,
}

/// A decoded successful response
#[derive(Debug)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Document(Html),
}

impl ResponseBody {
    pub fn into_json(self) -> Option<serde_json::Value> {
        match self {
            ResponseBody::Json(value) => Some(value),
            ResponseBody::Document(_) => None,
        }
    }

    pub fn as_document(&self) -> Option<&Html> {
        match self {
            ResponseBody::Document(document) => Some(document),
            ResponseBody::Json(_) => None,
        }
    }
}

/// Everything that identifies one logical request
///
/// Every retry re-sends exactly this request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub request: OutboundRequest,
    pub kind: ResponseKind,
    pub success_statuses: Vec<u16>,

    /// Overrides the executor's retry delay for this request
    pub retry_delay: Option<Duration>,
}

impl RequestSpec {
    /// A GET expecting a JSON response with status 200
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url.into(), None)
    }

    /// A POST of a JSON payload expecting a JSON response with status 200
    pub fn post_json(url: impl Into<String>, body: serde_json::Value) -> Self {
        Self::new(Method::POST, url.into(), Some(body))
    }

    fn new(method: Method, url: String, body: Option<serde_json::Value>) -> Self {
        Self {
            request: OutboundRequest { method, url, body },
            kind: ResponseKind::Json,
            success_statuses: vec![200],
            retry_delay: None,
        }
    }

    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_success_statuses(mut self, statuses: Vec<u16>) -> Self {
        self.success_statuses = statuses;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    fn accepts(&self, status: u16) -> bool {
        self.success_statuses.contains(&status)
    }
}

/// Retry timing shared by all requests of an executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,

    /// `None` retries forever
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_millis(1000))
    }
}

/// Statuses that indicate rate limiting by the remote service
fn is_rate_limited(status: u16) -> bool {
    status == 429 || status == 403
}

fn decode_json(body: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(body).map_err(|e| e.to_string())
}

/// Issues requests with indefinite fixed-delay retry and proxy rotation
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    rotator: Arc<ProxyRotator>,
    policy: RetryPolicy,
    cancel: Option<CancelSignal>,
    attempts: AtomicU64,
    failures: AtomicU64,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, rotator: Arc<ProxyRotator>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            rotator,
            policy,
            cancel: None,
            attempts: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Stops retrying once the signal fires
    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    pub fn retry_delay(&self) -> Duration {
        self.policy.delay
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.policy.max_attempts
    }

    pub fn rotator(&self) -> &ProxyRotator {
        &self.rotator
    }

    /// Attempts made so far, successful or not
    pub fn attempt_count(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// Attempts that ended in a retry
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Executes a request, retrying until a response in the success set
    /// decodes into the requested kind
    pub async fn execute(&self, spec: &RequestSpec) -> Result<ResponseBody, CrawlError> {
        match spec.kind {
            ResponseKind::Json => self.run(spec, decode_json).await.map(ResponseBody::Json),
            ResponseKind::Document => self
                .run(spec, |body| Ok(Html::parse_document(body)))
                .await
                .map(ResponseBody::Document),
        }
    }

    /// Like [`execute`](Self::execute), always decoding JSON
    pub async fn execute_json(&self, spec: &RequestSpec) -> Result<serde_json::Value, CrawlError> {
        self.run(spec, decode_json).await
    }

    /// Sleeps for `delay`, returning early with `Cancelled` if the signal fires
    pub async fn back_off(&self, delay: Duration) -> Result<(), CrawlError> {
        match &self.cancel {
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
            Some(signal) => tokio::select! {
                _ = tokio::time::sleep(delay) => Ok(()),
                _ = signal.cancelled() => Err(CrawlError::Cancelled),
            },
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelSignal::is_cancelled)
    }

    async fn run<T, D>(&self, spec: &RequestSpec, decode: D) -> Result<T, CrawlError>
    where
        D: Fn(&str) -> Result<T, String>,
    {
        let delay = spec.retry_delay.unwrap_or(self.policy.delay);
        let url = &spec.request.url;
        let mut attempt: u32 = 0;

        loop {
            if self.is_cancelled() {
                return Err(CrawlError::Cancelled);
            }

            attempt += 1;
            self.attempts.fetch_add(1, Ordering::Relaxed);

            // None when proxying is disabled.
            let proxy = self.rotator.rotate();
            tracing::trace!("{} {} (attempt {})", spec.request.method, url, attempt);

            match self.transport.send(&spec.request, proxy.as_ref()).await {
                Ok(response) if spec.accepts(response.status) => match decode(&response.body) {
                    Ok(value) => {
                        if attempt > 1 {
                            tracing::debug!("{} succeeded after {} attempts", url, attempt);
                        }
                        return Ok(value);
                    }
                    Err(reason) => {
                        tracing::warn!(
                            "Undecodable response from {} (attempt {}): {}",
                            url,
                            attempt,
                            reason
                        );
                    }
                },
                Ok(response) if is_rate_limited(response.status) => {
                    tracing::warn!(
                        "Rate limited with status {} by {} (attempt {})",
                        response.status,
                        url,
                        attempt
                    );
                    if self.rotator.is_enabled() {
                        self.rotator.rotate();
                    }
                }
                Ok(response) => {
                    tracing::warn!(
                        "Unexpected status {} from {} (attempt {})",
                        response.status,
                        url,
                        attempt
                    );
                }
                Err(e) => {
                    tracing::warn!("Request failed (attempt {}): {}", attempt, e);
                }
            }

            self.failures.fetch_add(1, Ordering::Relaxed);

            if let Some(max_attempts) = self.policy.max_attempts {
                if attempt >= max_attempts {
                    return Err(CrawlError::RetriesExhausted {
                        url: url.clone(),
                        attempts: attempt,
                    });
                }
            }

            self.back_off(delay).await?;
        }
    }
}
