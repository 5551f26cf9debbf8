//! Event bus adapters driving the aggregator and the filter manager.
//!
//! Both workers own a [`Subscription`] created before they are spawned, so
//! no event published after service start is missed. Events lost to a
//! lagging subscription are reported to the aggregator as a
//! [`CycleEvent::StreamGap`].

use crate::domain::aggregator::{CycleEvent, ReceiptAggregator};
use crate::domain::manager::FilterManager;
use crate::domain::manager::Settlement;
use shared_bus::{
    BlockchainEvent, EventFilter, EventPublisher, EventTopic, Subscription, SubscriptionError,
};
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};

/// Topics consumed by the receipt aggregator.
pub fn aggregator_filter() -> EventFilter {
    EventFilter::topics(vec![
        EventTopic::Receipts,
        EventTopic::Inclusion,
        EventTopic::Blocks,
    ])
}

/// Topics consumed by the filter manager.
pub fn manager_filter() -> EventFilter {
    EventFilter::topics(vec![
        EventTopic::Aggregation,
        EventTopic::Blocks,
        EventTopic::Mempool,
    ])
}

impl TryFrom<BlockchainEvent> for CycleEvent {
    type Error = BlockchainEvent;

    fn try_from(event: BlockchainEvent) -> Result<Self, Self::Error> {
        match event {
            BlockchainEvent::ReceiptsProduced {
                height,
                round,
                receipts,
            } => Ok(CycleEvent::Receipts {
                height,
                round,
                receipts,
            }),
            BlockchainEvent::InclusionListFinalized(list) => Ok(CycleEvent::InclusionList(list)),
            BlockchainEvent::BlockCompleted(completion) => Ok(CycleEvent::BlockCompleted(completion)),
            other => Err(other),
        }
    }
}

/// Feeds receipt, inclusion and completion events into a
/// [`ReceiptAggregator`] and publishes every selection it emits.
pub struct AggregatorWorker {
    subscription: Subscription,
    publisher: Arc<dyn EventPublisher>,
    aggregator: ReceiptAggregator,
}

impl AggregatorWorker {
    pub fn new(
        subscription: Subscription,
        publisher: Arc<dyn EventPublisher>,
        aggregator: ReceiptAggregator,
    ) -> Self {
        Self {
            subscription,
            publisher,
            aggregator,
        }
    }

    /// Process events until the bus closes.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("[Aggregator] Started listening for receipt events");

        loop {
            let event = match self.subscription.recv().await {
                Ok(event) => match CycleEvent::try_from(event) {
                    Ok(event) => event,
                    Err(_) => continue,
                },
                Err(SubscriptionError::Lagged { missed }) => {
                    warn!(missed = missed, "[Aggregator] Lagged behind the event bus");
                    CycleEvent::StreamGap { missed }
                }
                Err(SubscriptionError::Closed) => break,
            };

            for selected in self.aggregator.handle(event) {
                let height = selected.height;
                let receivers = self
                    .publisher
                    .publish(BlockchainEvent::SelectedReceipts(selected))
                    .await;
                if receivers == 0 {
                    warn!(height = height, "No subscribers for selected receipts");
                }
            }
        }

        warn!("[Aggregator] Event stream ended, shutting down");
    }
}

/// Feeds selections, completions, pending blocks and pending transactions
/// into a [`FilterManager`].
pub struct FilterManagerWorker {
    subscription: Subscription,
    manager: FilterManager,
}

impl FilterManagerWorker {
    pub fn new(subscription: Subscription, manager: FilterManager) -> Self {
        Self {
            subscription,
            manager,
        }
    }

    /// Handle one event. Finalizing a block blocks on the rayon pools, so on
    /// a multi-thread runtime the worker thread is handed over for the
    /// duration.
    fn settle(&mut self, event: BlockchainEvent) -> Settlement {
        match Handle::current().runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| self.manager.on_event(event))
            }
            _ => self.manager.on_event(event),
        }
    }

    /// Process events until the bus closes.
    ///
    /// This should be spawned as a background task.
    pub async fn run(mut self) {
        info!("[FilterManager] Started listening for block events");

        loop {
            let event = match self.subscription.recv().await {
                Ok(event) => event,
                Err(SubscriptionError::Lagged { missed }) => {
                    // heights left incomplete are pruned once newer blocks settle
                    warn!(missed = missed, "[FilterManager] Lagged behind the event bus");
                    continue;
                }
                Err(SubscriptionError::Closed) => break,
            };

            let settlement = self.settle(event);
            debug!(settlement = ?settlement, "Filter manager handled event");
        }

        warn!("[FilterManager] Event stream ended, shutting down");
    }
}
