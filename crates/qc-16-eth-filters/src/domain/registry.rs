//! Filter Registry - concurrent, TTL-evicted store of client filters.
//!
//! Flow:
//! 1. A client installs a filter and receives an opaque [`FilterId`]
//! 2. The filter manager calls [`FilterRegistry::broadcast`] per finalized block
//! 3. The client polls with [`FilterRegistry::drain`], which also extends the
//!    filter's lifetime by one TTL
//! 4. Filters not polled within a TTL are removed by the eviction sweep

use crate::domain::criteria::LogCriteria;
use crate::domain::error::{FilterError, PipelineError};
use crate::domain::filter::{Expiry, Filter, Interest};
use crate::domain::types::{FilterChanges, FilterId};
use dashmap::DashMap;
use rayon::prelude::*;
use shared_types::entities::{BlockNumber, Hash, Log, Receipt};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Statistics for the filter registry
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Total filters created
    pub total_created: AtomicU64,
    /// Total filters removed by the client
    pub total_uninstalled: AtomicU64,
    /// Total filters removed by the eviction sweep
    pub total_evicted: AtomicU64,
    /// Total blocks broadcast
    pub total_blocks: AtomicU64,
}

/// Concurrent store of client filters.
pub struct FilterRegistry {
    filters: DashMap<FilterId, Arc<Filter>>,
    ttl: Duration,
    /// Bounded pool for broadcast fan-out
    pool: rayon::ThreadPool,
    stats: RegistryStats,
}

impl FilterRegistry {
    /// Create a registry whose filters live `ttl` past their last poll and
    /// whose broadcasts fan out over `workers` threads.
    pub fn new(ttl: Duration, workers: usize) -> Result<Self, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("filter-broadcast-{i}"))
            .build()?;

        Ok(Self {
            filters: DashMap::new(),
            ttl,
            pool,
            stats: RegistryStats::default(),
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Install a filter. Always succeeds.
    pub fn create_filter(&self, interest: Interest) -> FilterId {
        let id = FilterId::random();
        let kind = interest.kind();
        let filter = Filter::new(id, interest, self.ttl, Instant::now());

        self.filters.insert(id, Arc::new(filter));
        self.stats.total_created.fetch_add(1, Ordering::Relaxed);

        debug!(filter_id = %id, kind = ?kind, "Installed filter");
        id
    }

    pub fn new_log_filter(&self, criteria: LogCriteria) -> FilterId {
        self.create_filter(Interest::Logs(criteria))
    }

    pub fn new_block_filter(&self) -> FilterId {
        self.create_filter(Interest::Blocks)
    }

    pub fn new_pending_transaction_filter(&self) -> FilterId {
        self.create_filter(Interest::PendingTransactions)
    }

    /// Remove a filter. Returns false if it was not registered.
    pub fn uninstall(&self, id: &FilterId) -> bool {
        if self.filters.remove(id).is_some() {
            self.stats.total_uninstalled.fetch_add(1, Ordering::Relaxed);
            debug!(filter_id = %id, "Uninstalled filter");
            true
        } else {
            false
        }
    }

    /// Take everything buffered since the last drain and extend the
    /// filter's lifetime.
    pub fn drain(&self, id: &FilterId) -> Result<FilterChanges, FilterError> {
        let filter = self
            .filters
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or(FilterError::NotFound(*id))?;

        let changes = filter.drain(self.ttl, Instant::now());
        debug!(filter_id = %id, drained = changes.len(), "Drained filter");
        Ok(changes)
    }

    /// Criteria of a Logs filter.
    pub fn log_criteria(&self, id: &FilterId) -> Result<LogCriteria, FilterError> {
        self.filters
            .get(id)
            .and_then(|entry| entry.interest().as_criteria().cloned())
            .ok_or(FilterError::NotFound(*id))
    }

    pub fn contains(&self, id: &FilterId) -> bool {
        self.filters.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    fn snapshot(&self) -> Vec<Arc<Filter>> {
        self.filters
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Feed a finalized block to every registered filter.
    ///
    /// Block filters receive `block_hash`; Logs filters receive the logs
    /// their criteria select. Returns once every append has completed.
    pub fn broadcast(&self, height: BlockNumber, receipts: &[Receipt], block_hash: Hash) {
        self.stats.total_blocks.fetch_add(1, Ordering::Relaxed);

        let filters = self.snapshot();
        if filters.is_empty() {
            return;
        }

        let logs: Vec<&Log> = receipts.iter().flat_map(|r| r.logs.iter()).collect();
        let appended: usize = self.pool.install(|| {
            filters
                .par_iter()
                .map(|filter| filter.apply_block(height, block_hash, &logs))
                .sum()
        });

        debug!(
            height = height,
            block_hash = ?block_hash,
            filters = filters.len(),
            logs = logs.len(),
            appended = appended,
            "Broadcast block to filters"
        );
    }

    /// Feed newly pending transaction hashes to PendingTransaction filters.
    pub fn broadcast_pending_transactions(&self, hashes: &[Hash]) {
        if hashes.is_empty() {
            return;
        }

        let filters = self.snapshot();
        if filters.is_empty() {
            return;
        }

        self.pool.install(|| {
            filters.par_iter().for_each(|filter| {
                filter.apply_pending(hashes);
            })
        });

        debug!(
            hashes = hashes.len(),
            filters = filters.len(),
            "Broadcast pending transactions"
        );
    }

    /// Remove every filter whose deadline fired without being reset.
    ///
    /// Returns the number of filters removed.
    pub fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.filters.retain(|id, filter| match filter.check_expiry(now) {
            Expiry::Pending => true,
            Expiry::Expired => {
                debug!(filter_id = %id, kind = ?filter.kind(), "Evicting expired filter");
                removed += 1;
                false
            }
            Expiry::Inconsistent => {
                warn!(filter_id = %id, "Filter deadline inconsistent, skipping");
                true
            }
        });

        if removed > 0 {
            self.stats
                .total_evicted
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }
}

/// Background task that sweeps expired filters every `interval`.
///
/// Holds only a weak reference and ends once the registry is dropped. The
/// first sweep happens one `interval` after start, so a filter that is never
/// polled lives between one TTL and TTL + `interval`.
pub async fn eviction_task(registry: Weak<FilterRegistry>, interval: Duration) {
    let mut sweep = tokio::time::interval_at(Instant::now() + interval, interval);
    sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        sweep.tick().await;
        let Some(registry) = registry.upgrade() else {
            info!("Filter registry dropped, stopping eviction");
            return;
        };

        let removed = registry.evict_expired();
        if removed > 0 {
            info!(
                removed = removed,
                remaining = registry.len(),
                "Evicted expired filters"
            );
        }
    }
}

/// Spawn [`eviction_task`] on the current runtime.
pub fn spawn_eviction(registry: &Arc<FilterRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(eviction_task(Arc::downgrade(registry), interval))
}
