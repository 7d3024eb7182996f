//! Work queue and concurrency-bounded task pool
//!
//! A [`WorkQueue`] is an append-only list with a shared read cursor. Workers
//! claim items strictly in index order; every index is claimed by exactly one
//! worker, because claiming reads the item and advances the cursor under one
//! lock.
//!
//! A [`TaskPool`] runs a fixed number of worker chains over a queue. Items
//! appended while the pool is running (clusters discovered during expansion)
//! are picked up by the same chains. A chain that runs out of work while
//! others are still busy waits instead of exiting, so the pool only finishes
//! at the fixed point: every index claimed and no item in progress.

use crate::CrawlError;
use futures::future::join_all;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

struct QueueState<T> {
    items: Vec<T>,
    cursor: usize,
    running: usize,
    aborted: bool,
}

/// Result of trying to claim the next item
enum Claim<T> {
    /// The item at `index`, now counted as running
    Item { index: usize, item: T, running: usize },

    /// Nothing unclaimed, but running items may still append more
    Wait,

    /// Fixed point reached, or the run was aborted
    Done,
}

/// Append-only queue with a monotonically advancing claim cursor
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    changed: Notify,
}

impl<T: Clone> WorkQueue<T> {
    pub fn new() -> Self {
        Self::from_items(Vec::new())
    }

    pub fn from_items(items: Vec<T>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items,
                cursor: 0,
                running: 0,
                aborted: false,
            }),
            changed: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends items in order
    pub fn extend<I: IntoIterator<Item = T>>(&self, items: I) {
        let added = {
            let mut state = self.lock();
            let before = state.items.len();
            state.items.extend(items);
            state.items.len() - before
        };
        if added > 0 {
            self.changed.notify_waiters();
        }
    }

    /// Total number of items ever appended
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of items appended but not yet claimed
    pub fn unclaimed(&self) -> usize {
        let state = self.lock();
        state.items.len() - state.cursor
    }

    /// Number of claimed items still being processed
    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// Copy of all items in append order
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().items.clone()
    }

    /// Consumes the queue, returning all items in append order
    pub fn into_items(self) -> Vec<T> {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .items
    }

    fn try_claim(&self, limit: usize) -> Claim<T> {
        let mut state = self.lock();
        if state.aborted {
            return Claim::Done;
        }
        if state.cursor < state.items.len() && state.running < limit {
            let index = state.cursor;
            let item = state.items[index].clone();
            state.cursor += 1;
            state.running += 1;
            return Claim::Item {
                index,
                item,
                running: state.running,
            };
        }
        if state.running > 0 {
            Claim::Wait
        } else {
            Claim::Done
        }
    }

    fn finish(&self) {
        self.lock().running -= 1;
        self.changed.notify_waiters();
    }

    fn abort(&self) {
        self.lock().aborted = true;
        self.changed.notify_waiters();
    }
}

impl<T: Clone> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs a fixed number of worker chains over a [`WorkQueue`]
#[derive(Debug, Clone, Copy)]
pub struct TaskPool {
    limit: usize,
}

impl TaskPool {
    /// Creates a pool of `limit` chains (at least one)
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Drives `op` over the queue until the fixed point
    ///
    /// `op` may append to `queue`. All chains run cooperatively on the calling
    /// task. If `op` fails, no further items are claimed, chains already
    /// running finish their current item, and the first error is returned.
    pub async fn run<T, F, Fut>(&self, queue: &WorkQueue<T>, op: F) -> Result<(), CrawlError>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), CrawlError>>,
    {
        let chains = (0..self.limit).map(|chain| self.chain(chain, queue, &op));
        let outcomes = join_all(chains).await;

        match outcomes.into_iter().find_map(Result::err) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn chain<T, F, Fut>(&self, chain: usize, queue: &WorkQueue<T>, op: &F) -> Result<(), CrawlError>
    where
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), CrawlError>>,
    {
        loop {
            // Register interest before looking, so a change between the
            // check and the wait is not missed.
            let notified = queue.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match queue.try_claim(self.limit) {
                Claim::Item {
                    index,
                    item,
                    running,
                } => {
                    tracing::debug!(
                        "Chain {} claimed item {} (currently running: {})",
                        chain,
                        index,
                        running
                    );
                    let outcome = op(item).await;
                    queue.finish();
                    if let Err(error) = outcome {
                        tracing::debug!("Chain {} stopping: {}", chain, error);
                        queue.abort();
                        return Err(error);
                    }
                }
                Claim::Wait => notified.await,
                Claim::Done => {
                    tracing::trace!("Chain {} finished", chain);
                    return Ok(());
                }
            }
        }
    }
}
