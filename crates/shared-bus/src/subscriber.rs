//! # Event Subscriber
//!
//! A [`Subscription`] yields the events its [`EventFilter`] accepts. The
//! underlying channel is bounded: a consumer that falls behind loses the
//! oldest events, and the loss is reported to the caller as
//! [`SubscriptionError::Lagged`] so it can discard state built on an
//! incomplete stream.

use crate::events::{BlockchainEvent, EventFilter, EventTopic};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::debug;

/// Live subscription count per topic. Filters accepting everything are
/// counted under [`EventTopic::All`].
pub(crate) type TopicCounts = Arc<RwLock<HashMap<EventTopic, usize>>>;

/// Errors from subscription operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The event bus was closed.
    #[error("Event bus closed")]
    Closed,
    /// The subscriber fell behind and `missed` events were overwritten.
    /// The subscription stays usable.
    #[error("Subscriber lagged, {missed} events lost")]
    Lagged { missed: u64 },
}

/// A subscription handle for receiving events.
///
/// Dropping it unregisters its topics from the bus.
pub struct Subscription {
    receiver: broadcast::Receiver<BlockchainEvent>,
    filter: EventFilter,
    counts: TopicCounts,
    missed: u64,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<BlockchainEvent>,
        filter: EventFilter,
        counts: TopicCounts,
    ) -> Self {
        {
            let mut counts = counts.write();
            for topic in filter.counted_topics() {
                *counts.entry(topic).or_insert(0) += 1;
            }
        }
        Self {
            receiver,
            filter,
            counts,
            missed: 0,
        }
    }

    /// Wait for the next event accepted by the filter.
    ///
    /// A lag is returned as soon as it is detected, before any event that
    /// follows the gap.
    pub async fn recv(&mut self) -> Result<BlockchainEvent, SubscriptionError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Ok(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => return Err(SubscriptionError::Closed),
                Err(broadcast::error::RecvError::Lagged(missed)) => return Err(self.lagged(missed)),
            }
        }
    }

    /// Take the next accepted event if one is already queued.
    pub fn try_recv(&mut self) -> Result<Option<BlockchainEvent>, SubscriptionError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Ok(Some(event)),
                Ok(_) => {}
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(SubscriptionError::Closed)
                }
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    return Err(self.lagged(missed))
                }
            }
        }
    }

    fn lagged(&mut self, missed: u64) -> SubscriptionError {
        self.missed = self.missed.saturating_add(missed);
        SubscriptionError::Lagged { missed }
    }

    /// Total events lost to lag over the subscription's lifetime. Lost
    /// events of topics outside the filter are included.
    #[must_use]
    pub fn missed(&self) -> u64 {
        self.missed
    }

    #[must_use]
    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut counts = self.counts.write();
        for topic in self.filter.counted_topics() {
            if let Some(count) = counts.get_mut(&topic) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    counts.remove(&topic);
                }
            }
        }
        debug!(topics = ?self.filter.topics, missed = self.missed, "Subscription dropped");
    }
}
