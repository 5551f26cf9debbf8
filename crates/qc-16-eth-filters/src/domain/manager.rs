//! # Filter Manager
//!
//! Joins, per height, the three inputs that complete a block:
//!
//! - the selected receipts from the aggregator
//! - the block-completed signal
//! - the pending block carrying the block hash
//!
//! Once a block completed successfully and all three parts are present,
//! the receipts are finalized and broadcast to the filter registry. A failed
//! block settles without any effect.

use crate::domain::error::PipelineError;
use crate::domain::finalize::finalize_receipts;
use crate::domain::registry::FilterRegistry;
use shared_bus::BlockchainEvent;
use shared_types::entities::{
    BlockCompletion, BlockNumber, CompletionStatus, Hash, PendingBlock, SelectedReceipts,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Parts collected for one height.
#[derive(Debug, Default)]
struct Join {
    selected: Option<SelectedReceipts>,
    completion: Option<BlockCompletion>,
    block: Option<PendingBlock>,
}

/// Result of handling one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Part stored, the height is not complete yet.
    Waiting { height: BlockNumber },
    /// Block finalized and broadcast.
    Broadcast {
        height: BlockNumber,
        block_hash: Hash,
        receipts: usize,
    },
    /// Block completed without effect on the filters.
    Skipped { height: BlockNumber },
    /// Part for a height that is settled or too old.
    Stale { height: BlockNumber },
    /// Pending transactions handed to the registry.
    Forwarded { hashes: usize },
    /// Event not consumed by the manager.
    Ignored,
}

/// Completes blocks and feeds them to the registry.
pub struct FilterManager {
    registry: Arc<FilterRegistry>,
    /// Bounded pool for receipt stamping
    pool: rayon::ThreadPool,
    joins: BTreeMap<BlockNumber, Join>,
    settled: BTreeSet<BlockNumber>,
    max_pending_heights: u64,
    newest: Option<BlockNumber>,
}

impl FilterManager {
    pub fn new(
        registry: Arc<FilterRegistry>,
        workers: usize,
        max_pending_heights: u64,
    ) -> Result<Self, PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("receipt-finalize-{i}"))
            .build()?;

        Ok(Self {
            registry,
            pool,
            joins: BTreeMap::new(),
            settled: BTreeSet::new(),
            max_pending_heights: max_pending_heights.max(1),
            newest: None,
        })
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    /// Heights with parts still waiting.
    pub fn open_heights(&self) -> Vec<BlockNumber> {
        self.joins.keys().copied().collect()
    }

    /// Handle one bus event.
    pub fn on_event(&mut self, event: BlockchainEvent) -> Settlement {
        match event {
            BlockchainEvent::SelectedReceipts(selected) => {
                let height = selected.height;
                self.store(height, |join| join.selected = Some(selected))
            }
            BlockchainEvent::BlockCompleted(completion) => {
                let height = completion.height;
                self.store(height, |join| join.completion = Some(completion))
            }
            BlockchainEvent::PendingBlockProposed(block) => {
                self.store(block.height, |join| join.block = Some(block))
            }
            BlockchainEvent::PendingTransactions { hashes } => {
                self.registry.broadcast_pending_transactions(&hashes);
                Settlement::Forwarded {
                    hashes: hashes.len(),
                }
            }
            _ => Settlement::Ignored,
        }
    }

    fn store(&mut self, height: BlockNumber, put: impl FnOnce(&mut Join)) -> Settlement {
        if self.settled.contains(&height) || height < self.floor() {
            debug!(height = height, "Dropping part for settled height");
            return Settlement::Stale { height };
        }

        put(self.joins.entry(height).or_default());
        self.newest = Some(self.newest.map_or(height, |n| n.max(height)));

        let settlement = self.try_settle(height);
        self.prune();
        settlement
    }

    fn try_settle(&mut self, height: BlockNumber) -> Settlement {
        let ready = match self.joins.get(&height) {
            Some(Join {
                completion: Some(completion),
                selected,
                block,
            }) => !completion.status.is_success() || (selected.is_some() && block.is_some()),
            _ => false,
        };
        if !ready {
            return Settlement::Waiting { height };
        }

        let Some(join) = self.joins.remove(&height) else {
            return Settlement::Waiting { height };
        };
        self.settled.insert(height);

        let Some(completion) = join.completion else {
            return Settlement::Waiting { height };
        };
        self.finalize_block(completion, join.selected, join.block.as_ref())
    }

    /// Finalize a completed block and broadcast it.
    ///
    /// A failed completion, missing receipts or a missing pending block make
    /// this a no-op.
    pub fn finalize_block(
        &self,
        completion: BlockCompletion,
        selected: Option<SelectedReceipts>,
        block: Option<&PendingBlock>,
    ) -> Settlement {
        let height = completion.height;

        if let CompletionStatus::Failed(reason) = &completion.status {
            debug!(height = height, reason = %reason, "Block failed, nothing to broadcast");
            return Settlement::Skipped { height };
        }

        let Some(mut selected) = selected else {
            warn!(height = height, "Block completed without selected receipts");
            return Settlement::Skipped { height };
        };

        let Some(block) = block.filter(|b| b.height == height) else {
            warn!(height = height, "Block completed without pending block");
            return Settlement::Skipped { height };
        };

        finalize_receipts(&self.pool, height, block.hash, &mut selected.receipts);
        self.registry.broadcast(height, &selected.receipts, block.hash);

        info!(
            height = height,
            block_hash = ?block.hash,
            receipts = selected.receipts.len(),
            "Finalized block"
        );
        Settlement::Broadcast {
            height,
            block_hash: block.hash,
            receipts: selected.receipts.len(),
        }
    }

    /// Lowest height still accepted.
    fn floor(&self) -> BlockNumber {
        self.newest
            .map_or(0, |n| n.saturating_sub(self.max_pending_heights))
    }

    fn prune(&mut self) {
        let floor = self.floor();

        let kept = self.joins.split_off(&floor);
        let dropped = std::mem::replace(&mut self.joins, kept);
        for (height, join) in dropped {
            let succeeded = join
                .completion
                .as_ref()
                .is_some_and(|c| c.status.is_success());
            if succeeded {
                warn!(
                    height = height,
                    has_receipts = join.selected.is_some(),
                    has_block = join.block.is_some(),
                    "Skipped incomplete block"
                );
            } else {
                debug!(height = height, "Pruned open height");
            }
        }

        self.settled = self.settled.split_off(&floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::criteria::LogCriteria;
    use crate::domain::filter::Interest;
    use shared_types::entities::{Address, Log, Receipt};
    use std::time::Duration;

    fn manager(max_pending_heights: u64) -> FilterManager {
        let registry = Arc::new(FilterRegistry::new(Duration::from_secs(60), 2).unwrap());
        FilterManager::new(registry, 2, max_pending_heights).unwrap()
    }

    fn selected(height: BlockNumber, txs: &[u8]) -> BlockchainEvent {
        BlockchainEvent::SelectedReceipts(SelectedReceipts {
            height,
            round: 0,
            receipts: txs
                .iter()
                .map(|n| {
                    let logs = vec![Log::new(Address::repeat_byte(1), vec![], vec![])];
                    Receipt::new(Hash::repeat_byte(*n), logs)
                })
                .collect(),
        })
    }

    fn completed(height: BlockNumber) -> BlockchainEvent {
        BlockchainEvent::BlockCompleted(BlockCompletion::success(height))
    }

    fn proposed(height: BlockNumber) -> BlockchainEvent {
        BlockchainEvent::PendingBlockProposed(PendingBlock {
            hash: Hash::from_low_u64_be(height),
            height,
        })
    }

    #[test]
    fn test_broadcast_after_all_parts() {
        let mut manager = manager(8);
        let logs = manager
            .registry()
            .create_filter(Interest::Logs(LogCriteria::default()));

        assert_eq!(manager.on_event(completed(5)), Settlement::Waiting { height: 5 });
        assert_eq!(manager.on_event(proposed(5)), Settlement::Waiting { height: 5 });
        assert_eq!(
            manager.on_event(selected(5, &[3, 1, 2])),
            Settlement::Broadcast {
                height: 5,
                block_hash: Hash::from_low_u64_be(5),
                receipts: 3
            }
        );

        let changes = manager.registry().drain(&logs).unwrap();
        let logs = changes.as_logs().unwrap();
        assert_eq!(logs.len(), 3);
        for (i, (log, tx)) in logs.iter().zip([3u8, 1, 2]).enumerate() {
            assert_eq!(log.transaction_index, i as u64);
            assert_eq!(log.transaction_hash, Hash::repeat_byte(tx));
            assert_eq!(log.log_index, i as u64);
            assert_eq!(log.block_number, 5);
            assert_eq!(log.block_hash, Hash::from_low_u64_be(5));
        }
    }

    #[test]
    fn test_failed_block_is_noop() {
        let mut manager = manager(8);
        let blocks = manager.registry().new_block_filter();

        manager.on_event(selected(2, &[1]));
        manager.on_event(proposed(2));
        let failed = BlockchainEvent::BlockCompleted(BlockCompletion::failed(2, "invalid"));
        assert_eq!(manager.on_event(failed), Settlement::Skipped { height: 2 });

        assert!(manager.registry().drain(&blocks).unwrap().is_empty());
        assert!(manager.open_heights().is_empty());
    }

    #[test]
    fn test_parts_after_settlement_are_stale() {
        let mut manager = manager(8);
        manager.on_event(selected(1, &[]));
        manager.on_event(proposed(1));
        manager.on_event(completed(1));

        assert_eq!(manager.on_event(proposed(1)), Settlement::Stale { height: 1 });
        assert!(manager.open_heights().is_empty());
    }

    #[test]
    fn test_empty_block_still_broadcasts_hash() {
        let mut manager = manager(8);
        let blocks = manager.registry().new_block_filter();

        manager.on_event(proposed(9));
        manager.on_event(selected(9, &[]));
        manager.on_event(completed(9));

        let changes = manager.registry().drain(&blocks).unwrap();
        assert_eq!(changes.as_hashes().unwrap(), &[Hash::from_low_u64_be(9)]);
    }

    #[test]
    fn test_incomplete_heights_pruned() {
        let mut manager = manager(2);
        manager.on_event(completed(1));
        manager.on_event(selected(2, &[]));
        assert_eq!(manager.open_heights(), vec![1, 2]);

        manager.on_event(proposed(4));
        assert_eq!(manager.open_heights(), vec![2, 4]);
        assert_eq!(manager.on_event(proposed(1)), Settlement::Stale { height: 1 });
    }

    #[test]
    fn test_finalize_without_block_skips() {
        let manager = manager(8);
        let completion = BlockCompletion::success(3);
        let selected = SelectedReceipts {
            height: 3,
            round: 0,
            receipts: vec![],
        };
        assert_eq!(
            manager.finalize_block(completion, Some(selected), None),
            Settlement::Skipped { height: 3 }
        );
    }

    #[test]
    fn test_pending_transactions_forwarded() {
        let mut manager = manager(8);
        let pending = manager.registry().new_pending_transaction_filter();

        let event = BlockchainEvent::PendingTransactions {
            hashes: vec![Hash::repeat_byte(1), Hash::repeat_byte(2)],
        };
        assert_eq!(manager.on_event(event), Settlement::Forwarded { hashes: 2 });
        assert_eq!(manager.registry().drain(&pending).unwrap().len(), 2);
    }
}
