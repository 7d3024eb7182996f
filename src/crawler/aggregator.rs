//! Run-scoped accumulation of crawl results
//!
//! Collections only grow. Nothing is deduplicated here; uniqueness of leaves
//! follows from each cluster being expanded exactly once.

use crate::model::{ClusterNode, DetailDocument, LeafEntity};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Immutable copy of everything a run collected
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSnapshot {
    pub leaves: Vec<LeafEntity>,
    pub clusters: Vec<ClusterNode>,
    pub documents: Vec<DetailDocument>,
}

/// Append-only result store owned by one crawl
#[derive(Debug, Default)]
pub struct Aggregator {
    leaves: Mutex<Vec<LeafEntity>>,
    clusters: Mutex<Vec<ClusterNode>>,
    documents: Mutex<Vec<DetailDocument>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_leaves<I: IntoIterator<Item = LeafEntity>>(&self, leaves: I) {
        lock(&self.leaves).extend(leaves);
    }

    pub fn record_clusters<I: IntoIterator<Item = ClusterNode>>(&self, clusters: I) {
        lock(&self.clusters).extend(clusters);
    }

    /// Records a document and returns how many are stored now
    pub fn record_document(&self, document: DetailDocument) -> usize {
        let mut documents = lock(&self.documents);
        documents.push(document);
        documents.len()
    }

    pub fn leaf_count(&self) -> usize {
        lock(&self.leaves).len()
    }

    pub fn cluster_count(&self) -> usize {
        lock(&self.clusters).len()
    }

    pub fn document_count(&self) -> usize {
        lock(&self.documents).len()
    }

    pub fn snapshot(&self) -> ResultSnapshot {
        ResultSnapshot {
            leaves: lock(&self.leaves).clone(),
            clusters: lock(&self.clusters).clone(),
            documents: lock(&self.documents).clone(),
        }
    }
}
