//! Crawler module for cluster expansion and detail fetching
//!
//! This module contains the core crawling logic, including:
//! - HTTP transport and the resilient request executor
//! - Cluster frontier expansion
//! - The concurrency-bounded task pool driving both phases
//! - Result accumulation and overall crawl coordination

mod aggregator;
mod cancel;
mod coordinator;
mod executor;
mod fetcher;
mod pool;
mod walker;

#[cfg(test)]
mod testing;

pub use aggregator::{Aggregator, ResultSnapshot};
pub use cancel::{cancel_pair, CancelHandle, CancelSignal};
pub use coordinator::{crawl, Crawler};
pub use executor::{RequestExecutor, RequestSpec, ResponseBody, ResponseKind, RetryPolicy};
pub use fetcher::{
    build_http_client, OutboundRequest, RawResponse, ReqwestTransport, Transport, TransportError,
};
pub use pool::{TaskPool, WorkQueue};
pub use walker::{parse_expansion, ClusterWalker, Expansion, Frontier};
