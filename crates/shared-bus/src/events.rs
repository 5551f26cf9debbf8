//! # Blockchain Events
//!
//! Defines the block-ingestion events that flow through the shared bus.

use serde::{Deserialize, Serialize};
use shared_types::entities::{
    BlockCompletion, BlockNumber, Hash, InclusionList, PendingBlock, Receipt, SelectedReceipts,
};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockchainEvent {
    // =========================================================================
    // EXECUTION
    // =========================================================================
    /// A batch of receipts produced while executing a block.
    /// Batches for one block may arrive in any number and order.
    ReceiptsProduced {
        /// Block height the receipts belong to.
        height: BlockNumber,
        /// Consensus round.
        round: u64,
        /// The receipts in this batch.
        receipts: Vec<Receipt>,
    },

    // =========================================================================
    // CONSENSUS
    // =========================================================================
    /// The ordered list of transactions finalized into a block.
    InclusionListFinalized(InclusionList),

    /// The block being proposed at a height.
    PendingBlockProposed(PendingBlock),

    /// Processing of a block finished (committed or not).
    BlockCompleted(BlockCompletion),

    // =========================================================================
    // AGGREGATION
    // =========================================================================
    /// Receipts reduced to, and ordered by, the inclusion list.
    SelectedReceipts(SelectedReceipts),

    // =========================================================================
    // MEMPOOL
    // =========================================================================
    /// Transactions newly admitted to the pending pool.
    PendingTransactions {
        /// Transaction hashes in admission order.
        hashes: Vec<Hash>,
    },
}

impl BlockchainEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::ReceiptsProduced { .. } => EventTopic::Receipts,
            Self::InclusionListFinalized(_) => EventTopic::Inclusion,
            Self::PendingBlockProposed(_) | Self::BlockCompleted(_) => EventTopic::Blocks,
            Self::SelectedReceipts(_) => EventTopic::Aggregation,
            Self::PendingTransactions { .. } => EventTopic::Mempool,
        }
    }

    /// Block height the event refers to, if any.
    #[must_use]
    pub fn height(&self) -> Option<BlockNumber> {
        match self {
            Self::ReceiptsProduced { height, .. } => Some(*height),
            Self::InclusionListFinalized(list) => Some(list.height),
            Self::PendingBlockProposed(block) => Some(block.height),
            Self::BlockCompleted(completion) => Some(completion.height),
            Self::SelectedReceipts(selected) => Some(selected.height),
            Self::PendingTransactions { .. } => None,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Receipt batches from execution.
    Receipts,
    /// Inclusion lists from consensus.
    Inclusion,
    /// Pending-block and block-completion signals.
    Blocks,
    /// Aggregated receipt results.
    Aggregation,
    /// Pending transaction feed.
    Mempool,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &BlockchainEvent) -> bool {
        self.is_wildcard() || self.topics.contains(&event.topic())
    }

    /// Whether the filter accepts every topic.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.topics.is_empty() || self.topics.contains(&EventTopic::All)
    }

    /// Topics this filter is registered under on the bus, without repeats.
    pub(crate) fn counted_topics(&self) -> Vec<EventTopic> {
        if self.is_wildcard() {
            return vec![EventTopic::All];
        }
        let mut topics = self.topics.clone();
        topics.sort_by_key(|topic| *topic as u8);
        topics.dedup();
        topics
    }
}
