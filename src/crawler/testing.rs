//! In-memory transport and cluster trees for unit tests

use crate::crawler::fetcher::{OutboundRequest, RawResponse, Transport, TransportError};
use crate::model::ProxyDescriptor;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Handler = dyn Fn(&OutboundRequest, usize) -> Result<RawResponse, TransportError> + Send + Sync;
type Latency = dyn Fn(&OutboundRequest) -> Duration + Send + Sync;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub request: OutboundRequest,
    pub proxy: Option<ProxyDescriptor>,
}

/// Transport answering from a closure, recording every call
///
/// The handler receives the request and the zero-based call index.
pub struct MockTransport {
    handler: Box<Handler>,
    latency: Option<Box<Latency>>,
    calls: Mutex<Vec<RecordedCall>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&OutboundRequest, usize) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            latency: None,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Delays each response by a per-request duration
    pub fn with_latency<L>(mut self, latency: L) -> Self
    where
        L: Fn(&OutboundRequest) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Box::new(latency));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of calls observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: &OutboundRequest,
        proxy: Option<&ProxyDescriptor>,
    ) -> Result<RawResponse, TransportError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(RecordedCall {
                request: request.clone(),
                proxy: proxy.cloned(),
            });
            calls.len() - 1
        };

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(request)).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        (self.handler)(request, index)
    }
}

pub fn json_response(body: Value) -> Result<RawResponse, TransportError> {
    Ok(RawResponse {
        status: 200,
        body: body.to_string(),
    })
}

pub fn status(code: u16) -> Result<RawResponse, TransportError> {
    Ok(RawResponse {
        status: code,
        body: String::new(),
    })
}

pub fn refused() -> Result<RawResponse, TransportError> {
    Err(TransportError::Other("connection refused".to_string()))
}

/// A finite cluster hierarchy served the way the clustering API serves it
#[derive(Debug, Clone, Default)]
pub struct ClusterTree {
    children: HashMap<String, (Vec<String>, Vec<String>)>,
}

impl ClusterTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a cluster's child clusters and leaf keys
    pub fn node(mut self, key: &str, clusters: &[&str], leaves: &[&str]) -> Self {
        self.children.insert(
            key.to_string(),
            (
                clusters.iter().map(|c| c.to_string()).collect(),
                leaves.iter().map(|l| l.to_string()).collect(),
            ),
        );
        self
    }

    /// A complete tree with `fanout` children per cluster, `depth` levels of
    /// clusters below the root, and `fanout` leaves under each bottom cluster
    pub fn balanced(root: &str, fanout: usize, depth: usize) -> Self {
        fn grow(tree: &mut ClusterTree, key: String, fanout: usize, depth: usize) {
            if depth == 0 {
                let leaves = (0..fanout).map(|i| format!("{}-m{}", key, i)).collect();
                tree.children.insert(key, (Vec::new(), leaves));
                return;
            }
            let clusters: Vec<String> = (0..fanout).map(|i| format!("{}.{}", key, i)).collect();
            // One stray leaf at every inner level too.
            let leaves = vec![format!("{}-inner", key)];
            tree.children.insert(key, (clusters.clone(), leaves));
            for child in clusters {
                grow(tree, child, fanout, depth - 1);
            }
        }

        let mut tree = ClusterTree::new();
        grow(&mut tree, root.to_string(), fanout, depth);
        tree
    }

    /// Every leaf key in the tree
    pub fn leaf_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .children
            .values()
            .flat_map(|(_, leaves)| leaves.iter().cloned())
            .collect();
        keys.sort();
        keys
    }

    /// Number of clusters in the tree, roots included
    pub fn cluster_count(&self) -> usize {
        self.children.len()
    }

    /// Builds the expansion response for a batch of cluster keys
    pub fn expansion(&self, keys: &[String]) -> Value {
        let mut markers = serde_json::Map::new();
        let mut clusters = serde_json::Map::new();

        for (group, key) in keys.iter().enumerate() {
            let Some((child_clusters, leaves)) = self.children.get(key) else {
                continue;
            };
            if !leaves.is_empty() {
                let list: Vec<Value> = leaves.iter().map(|leaf| leaf_json(leaf, key)).collect();
                markers.insert(format!("g{}", group), Value::Array(list));
            }
            if !child_clusters.is_empty() {
                let list: Vec<Value> = child_clusters.iter().map(|c| cluster_json(c)).collect();
                clusters.insert(format!("g{}", group), Value::Array(list));
            }
        }

        json!({ "markers": markers, "clusters": clusters })
    }

    /// Serves POSTs as cluster expansions and GETs as detail documents
    pub fn respond(&self, request: &OutboundRequest) -> Result<RawResponse, TransportError> {
        match &request.body {
            Some(body) => {
                let keys: Vec<String> = serde_json::from_value(body.clone())
                    .map_err(|e| TransportError::Other(e.to_string()))?;
                json_response(self.expansion(&keys))
            }
            None => {
                let key = request
                    .url
                    .rsplit('/')
                    .next()
                    .and_then(|name| name.strip_suffix(".json"))
                    .unwrap_or_default();
                json_response(json!({ "key": key }))
            }
        }
    }
}

pub fn leaf_json(key: &str, cluster_key: &str) -> Value {
    json!({
        "key": key,
        "cluster_key": cluster_key,
        "latitude": 35.0,
        "longitude": 139.0,
    })
}

pub fn cluster_json(key: &str) -> Value {
    json!({
        "cluster_key": key,
        "count": 2,
        "latitude": 35.0,
        "longitude": 139.0,
        "min_latitude": 34.5,
        "max_latitude": 35.5,
        "min_longitude": 138.5,
        "max_longitude": 139.5,
    })
}
