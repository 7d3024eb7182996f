//! Crawl coordinator - two-phase crawl orchestration
//!
//! Phase 1 expands the cluster tree from the seed keys until no unexpanded
//! cluster remains. Phase 2 fetches one detail document per discovered leaf.
//! Both phases run on the same [`TaskPool`] bound, and phase 2 only starts
//! once phase 1 has reached its fixed point.

use crate::config::Config;
use crate::crawler::aggregator::{Aggregator, ResultSnapshot};
use crate::crawler::cancel::CancelSignal;
use crate::crawler::executor::{RequestExecutor, RequestSpec, RetryPolicy};
use crate::crawler::fetcher::{ReqwestTransport, Transport};
use crate::crawler::pool::{TaskPool, WorkQueue};
use crate::crawler::walker::{ClusterWalker, Frontier};
use crate::model::{DetailDocument, LeafEntity};
use crate::proxy::ProxyRotator;
use crate::{ConfigError, CrawlError};
use std::sync::Arc;
use std::time::Instant;
use url::Url;

/// Main crawler structure
pub struct Crawler {
    config: Config,
    executor: RequestExecutor,
    aggregator: Aggregator,
    pool: TaskPool,
    detail_base: Url,
}

impl Crawler {
    /// Creates a crawler talking to the real endpoints
    ///
    /// # Arguments
    ///
    /// * `config` - A validated configuration
    ///
    /// # Returns
    ///
    /// * `Ok(Crawler)` - Ready to run
    /// * `Err(CrawlError)` - The HTTP client or the detail URL could not be built
    pub fn new(config: &Config) -> Result<Self, CrawlError> {
        let transport = ReqwestTransport::new(
            config.user_agent.value.as_str(),
            config.crawler.request_timeout(),
        )?;
        let rotator = ProxyRotator::new(config.proxy.pool.clone(), config.proxy.policy);

        Self::with_transport(config, Arc::new(transport), rotator)
    }

    /// Creates a crawler on top of an arbitrary transport and rotator
    pub fn with_transport(
        config: &Config,
        transport: Arc<dyn Transport>,
        rotator: ProxyRotator,
    ) -> Result<Self, CrawlError> {
        let detail_base = Url::parse(&config.endpoints.detail)
            .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.endpoints.detail, e)))?;
        if detail_base.cannot_be_a_base() {
            return Err(ConfigError::InvalidUrl(format!(
                "{}: cannot hold a path",
                config.endpoints.detail
            ))
            .into());
        }

        let policy = RetryPolicy::fixed(config.crawler.retry_delay())
            .with_max_attempts(config.crawler.max_attempts());

        Ok(Self {
            config: config.clone(),
            executor: RequestExecutor::new(transport, Arc::new(rotator), policy),
            aggregator: Aggregator::new(),
            pool: TaskPool::new(config.crawler.concurrency_limit),
            detail_base,
        })
    }

    /// Stops the crawl early when the signal fires
    pub fn with_cancel_signal(mut self, signal: CancelSignal) -> Self {
        self.executor = self.executor.with_cancel_signal(signal);
        self
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.executor
    }

    /// Runs both phases and returns everything collected
    ///
    /// Results accumulate in the crawler's [`Aggregator`]; running the same
    /// crawler twice appends to them.
    pub async fn run(&self) -> Result<ResultSnapshot, CrawlError> {
        let started = Instant::now();
        tracing::info!(
            "Starting crawl from {} root clusters with {} worker chains",
            self.config.seed.root_keys.len(),
            self.pool.limit()
        );

        let frontier = self.expand_clusters().await?;
        let leaves = frontier.leaves;
        self.aggregator.record_leaves(leaves.snapshot());

        self.fetch_details(&leaves).await?;

        let snapshot = self.aggregator.snapshot();
        tracing::info!(
            "Crawl completed: {} clusters, {} leaves, {} documents in {:?} ({} requests, {} retried)",
            snapshot.clusters.len(),
            snapshot.leaves.len(),
            snapshot.documents.len(),
            started.elapsed(),
            self.executor.attempt_count(),
            self.executor.failure_count()
        );

        Ok(snapshot)
    }

    /// Phase 1: expands clusters until the frontier stops growing
    ///
    /// Each claimed cluster is expanded with its own request. The returned
    /// frontier holds every cluster key (seeds first) and every leaf found.
    pub async fn expand_clusters(&self) -> Result<Frontier, CrawlError> {
        let started = Instant::now();
        let frontier = Frontier::seeded(self.config.seed.root_keys.iter().cloned());

        let expansions = {
            let walker = ClusterWalker::new(
                &self.executor,
                &self.config.endpoints.cluster,
                &self.config.endpoints.cluster_success_statuses,
                &frontier,
                &self.aggregator,
            );

            self.pool
                .run(&frontier.clusters, |key| {
                    let walker = &walker;
                    async move { walker.expand(std::slice::from_ref(&key)).await }
                })
                .await?;

            walker.expansion_count()
        };

        tracing::info!(
            "Cluster phase finished: {} expansions, {} clusters, {} leaves in {:?}",
            expansions,
            frontier.clusters.len(),
            frontier.leaves.len(),
            started.elapsed()
        );

        Ok(frontier)
    }

    /// Phase 2: fetches the detail document of every leaf in the queue
    pub async fn fetch_details(&self, leaves: &WorkQueue<LeafEntity>) -> Result<(), CrawlError> {
        let started = Instant::now();
        let total = leaves.len();
        tracing::info!("Fetching {} detail documents", total);

        self.pool
            .run(leaves, |leaf| async move { self.fetch_detail(leaf, total).await })
            .await?;

        tracing::info!(
            "Detail phase finished: {} documents in {:?}",
            self.aggregator.document_count(),
            started.elapsed()
        );
        Ok(())
    }

    async fn fetch_detail(&self, leaf: LeafEntity, total: usize) -> Result<(), CrawlError> {
        let url = self.detail_url(&leaf.key);
        let body = self.executor.execute_json(&RequestSpec::get(url)).await?;

        let stored = self.aggregator.record_document(DetailDocument {
            leaf_key: leaf.key,
            body,
        });

        tracing::trace!("Stored document {} of {}", stored, total);
        if stored % 100 == 0 {
            tracing::info!("Progress: {} of {} detail documents fetched", stored, total);
        }
        Ok(())
    }

    /// `<detail endpoint>/<key>.json`
    pub fn detail_url(&self, key: &str) -> String {
        let mut url = self.detail_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&format!("{}.json", key));
        }
        url.into()
    }
}

/// Runs a complete crawl with the real transport
///
/// # Example
///
/// ```no_run
/// use cluster_sweep::config::load_config;
/// use cluster_sweep::crawler::crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("config.toml"))?;
/// let snapshot = crawl(&config).await?;
/// println!("{} documents", snapshot.documents.len());
/// # Ok(())
/// # }
/// ```
pub async fn crawl(config: &Config) -> Result<ResultSnapshot, CrawlError> {
    Crawler::new(config)?.run().await
}
