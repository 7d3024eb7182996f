//! Cluster frontier walker
//!
//! Expands batches of cluster keys through the clustering endpoint. Each
//! response lists the children of the requested clusters in two keyed groups:
//!
//! ```json
//! {
//!   "markers":  { "<group>": [ { "key": "...", "cluster_key": "...", ... } ] },
//!   "clusters": { "<group>": [ { "cluster_key": "...", "count": 12, ... } ] }
//! }
//! ```
//!
//! Group ids mean nothing and are dropped. Leaves go to the leaf queue, child
//! clusters go back onto the cluster queue for later expansion.

use crate::crawler::aggregator::Aggregator;
use crate::crawler::executor::{RequestExecutor, RequestSpec};
use crate::crawler::pool::WorkQueue;
use crate::model::{ClusterKey, ClusterNode, LeafEntity};
use crate::CrawlError;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

/// The queues the cluster phase works on
pub struct Frontier {
    /// Clusters to expand; starts with the seed keys and only grows
    pub clusters: WorkQueue<ClusterKey>,

    /// Leaves discovered so far
    pub leaves: WorkQueue<LeafEntity>,
}

impl Frontier {
    /// Seeds the cluster queue; a key listed twice is only queued once
    pub fn seeded<I: IntoIterator<Item = ClusterKey>>(root_keys: I) -> Self {
        let mut seen = HashSet::new();
        let roots: Vec<ClusterKey> = root_keys
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .collect();

        Self {
            clusters: WorkQueue::from_items(roots),
            leaves: WorkQueue::new(),
        }
    }
}

/// Children of one expanded batch
#[derive(Debug, Default, PartialEq)]
pub struct Expansion {
    pub leaves: Vec<LeafEntity>,
    pub clusters: Vec<ClusterNode>,
}

/// A group container: normally an object, but an empty one may arrive as `[]`
#[derive(Deserialize)]
#[serde(untagged)]
enum Groups<T> {
    Keyed(BTreeMap<String, Vec<T>>),
    Listed(Vec<Vec<T>>),
}

impl<T> Groups<T> {
    fn flatten(self) -> Vec<T> {
        match self {
            Groups::Keyed(groups) => groups.into_values().flatten().collect(),
            Groups::Listed(groups) => groups.into_iter().flatten().collect(),
        }
    }
}

#[derive(Deserialize)]
struct ExpansionResponse {
    #[serde(default)]
    markers: Option<Groups<LeafEntity>>,
    #[serde(default)]
    clusters: Option<Groups<ClusterNode>>,
}

/// Parses an expansion response body
///
/// A missing or `null` group container counts as empty, but at least one of
/// `markers` and `clusters` must be present. A cluster entry only needs its
/// `cluster_key`; leaf entries need all their fields. Anything else that does
/// not match the expected shape is an error.
pub fn parse_expansion(body: serde_json::Value) -> Result<Expansion, String> {
    if !body.is_object() {
        return Err(format!("expected a JSON object, got {}", body));
    }

    let response: ExpansionResponse = serde_json::from_value(body).map_err(|e| e.to_string())?;
    if response.markers.is_none() && response.clusters.is_none() {
        return Err("response has neither markers nor clusters".to_string());
    }

    Ok(Expansion {
        leaves: response.markers.map(Groups::flatten).unwrap_or_default(),
        clusters: response.clusters.map(Groups::flatten).unwrap_or_default(),
    })
}

/// Expands cluster batches into the frontier
pub struct ClusterWalker<'a> {
    executor: &'a RequestExecutor,
    endpoint: &'a str,
    success_statuses: &'a [u16],
    frontier: &'a Frontier,
    aggregator: &'a Aggregator,
    expansions: AtomicUsize,
}

impl<'a> ClusterWalker<'a> {
    pub fn new(
        executor: &'a RequestExecutor,
        endpoint: &'a str,
        success_statuses: &'a [u16],
        frontier: &'a Frontier,
        aggregator: &'a Aggregator,
    ) -> Self {
        Self {
            executor,
            endpoint,
            success_statuses,
            frontier,
            aggregator,
            expansions: AtomicUsize::new(0),
        }
    }

    /// Number of batches expanded so far
    pub fn expansion_count(&self) -> usize {
        self.expansions.load(Ordering::Relaxed)
    }

    /// Expands one batch of cluster keys with a single request
    ///
    /// A malformed response is retried like a failed request: after the retry
    /// delay the same batch is requested again. Nothing is appended until a
    /// response parses completely.
    pub async fn expand(&self, keys: &[ClusterKey]) -> Result<(), CrawlError> {
        let spec = RequestSpec::post_json(self.endpoint, serde_json::json!(keys))
            .with_success_statuses(self.success_statuses.to_vec());

        let mut malformed: u32 = 0;
        loop {
            let body = self.executor.execute_json(&spec).await?;

            match parse_expansion(body) {
                Ok(expansion) => {
                    self.apply(keys, expansion);
                    return Ok(());
                }
                Err(reason) => {
                    malformed += 1;
                    tracing::warn!(
                        "Malformed expansion of {:?} (attempt {}): {}",
                        keys,
                        malformed,
                        reason
                    );
                    if let Some(max_attempts) = self.executor.max_attempts() {
                        if malformed >= max_attempts {
                            return Err(CrawlError::RetriesExhausted {
                                url: self.endpoint.to_string(),
                                attempts: malformed,
                            });
                        }
                    }
                    self.executor.back_off(self.executor.retry_delay()).await?;
                }
            }
        }
    }

    fn apply(&self, keys: &[ClusterKey], expansion: Expansion) {
        let new_leaves = expansion.leaves.len();
        let new_clusters = expansion.clusters.len();

        self.frontier.leaves.extend(expansion.leaves);
        self.frontier
            .clusters
            .extend(expansion.clusters.iter().map(|node| node.cluster_key.clone()));
        self.aggregator.record_clusters(expansion.clusters);

        let done = self.expansions.fetch_add(1, Ordering::Relaxed) + 1;
        let total_clusters = self.frontier.clusters.len();
        let total_leaves = self.frontier.leaves.len();

        tracing::debug!(
            "Expanded {:?}: +{} clusters, +{} leaves (total: {} clusters, {} leaves)",
            keys,
            new_clusters,
            new_leaves,
            total_clusters,
            total_leaves
        );
        if done % 100 == 0 {
            tracing::info!(
                "Progress: {} expansions, {} clusters and {} leaves discovered, {} clusters pending",
                done,
                total_clusters,
                total_leaves,
                self.frontier.clusters.unclaimed()
            );
        }
    }
}
