//! Proxy rotation
//!
//! The rotator holds a fixed pool of proxies and re-draws one uniformly at
//! random whenever asked. Rotation is memoryless: a proxy that just failed can
//! be drawn again. There is no scoring or health tracking.

use crate::model::ProxyDescriptor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// How proxying is switched on for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProxyPolicy {
    /// Draw once at startup; proxying is enabled only if that first draw is
    /// usable. Later draws cover the whole pool and are not re-validated.
    #[default]
    FirstPick,

    /// Drop unusable entries up front; proxying is enabled if any remain.
    UsableOnly,
}

/// Random proxy selection over a fixed pool
pub struct ProxyRotator {
    pool: Vec<ProxyDescriptor>,
    enabled: bool,
    current: Mutex<Option<ProxyDescriptor>>,
    rng: Mutex<StdRng>,
    draws: AtomicU64,
}

impl ProxyRotator {
    /// Creates a rotator and makes the initial draw
    pub fn new(pool: Vec<ProxyDescriptor>, policy: ProxyPolicy) -> Self {
        Self::with_rng(pool, policy, StdRng::from_entropy())
    }

    /// Creates a rotator with a deterministic random source
    pub fn with_seed(pool: Vec<ProxyDescriptor>, policy: ProxyPolicy, seed: u64) -> Self {
        Self::with_rng(pool, policy, StdRng::seed_from_u64(seed))
    }

    /// A rotator that never hands out a proxy
    pub fn disabled() -> Self {
        Self::new(Vec::new(), ProxyPolicy::FirstPick)
    }

    fn with_rng(pool: Vec<ProxyDescriptor>, policy: ProxyPolicy, mut rng: StdRng) -> Self {
        let configured = pool.len();
        let pool: Vec<ProxyDescriptor> = match policy {
            ProxyPolicy::FirstPick => pool,
            ProxyPolicy::UsableOnly => pool.into_iter().filter(|p| p.is_usable()).collect(),
        };

        let initial = pool.choose(&mut rng).cloned();
        let draws = u64::from(initial.is_some());

        // Decided once; never re-evaluated for the rest of the run.
        let enabled = initial.as_ref().is_some_and(|proxy| proxy.is_usable());

        match (&initial, enabled) {
            (Some(proxy), true) => {
                tracing::info!(
                    "Proxying enabled: {} of {} configured proxies in rotation, starting with {}",
                    pool.len(),
                    configured,
                    proxy
                );
            }
            (Some(proxy), false) => {
                tracing::warn!(
                    "Initial proxy '{}' is not usable; proxying disabled for this run",
                    proxy
                );
            }
            (None, _) if configured > 0 => {
                tracing::warn!("No usable proxies configured; proxying disabled for this run");
            }
            (None, _) => {
                tracing::debug!("No proxies configured; connecting directly");
            }
        }

        Self {
            pool,
            enabled,
            current: Mutex::new(initial),
            rng: Mutex::new(rng),
            draws: AtomicU64::new(draws),
        }
    }

    /// Whether requests should go through a proxy at all
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The proxy most recently drawn, or `None` when proxying is disabled
    pub fn current(&self) -> Option<ProxyDescriptor> {
        if !self.enabled {
            return None;
        }
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Draws a new proxy uniformly at random and makes it current
    ///
    /// Returns `None` without drawing when proxying is disabled.
    pub fn rotate(&self) -> Option<ProxyDescriptor> {
        if !self.enabled {
            return None;
        }

        let next = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.pool.choose(&mut *rng).cloned()
        };
        self.draws.fetch_add(1, Ordering::Relaxed);

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        current.clone_from(&next);
        tracing::trace!(
            "Rotated proxy to {}",
            next.as_ref().map(ToString::to_string).unwrap_or_default()
        );
        next
    }

    /// Total number of draws made, including the initial one
    pub fn draw_count(&self) -> u64 {
        self.draws.load(Ordering::Relaxed)
    }

    /// Number of entries draws are made from
    pub fn pool_size(&self) -> usize {
        self.pool.len()
    }
}

impl std::fmt::Debug for ProxyRotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyRotator")
            .field("pool_size", &self.pool.len())
            .field("enabled", &self.enabled)
            .field("draws", &self.draw_count())
            .finish()
    }
}
