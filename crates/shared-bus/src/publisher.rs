//! # Event Publisher
//!
//! [`InMemoryEventBus`] fans every event out over one bounded
//! `tokio::sync::broadcast` channel; each [`Subscription`] filters its own
//! copy by topic. Publishing never blocks: a subscriber that falls more
//! than `capacity` events behind loses the oldest ones.

use crate::events::{BlockchainEvent, EventFilter, EventTopic};
use crate::subscriber::{Subscription, TopicCounts};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Trait for publishing events to the bus.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the bus.
    ///
    /// Returns the number of live subscriptions whose filter accepts the
    /// event.
    async fn publish(&self, event: BlockchainEvent) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// In-memory event bus shared by the ingestion components.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<BlockchainEvent>,
    counts: TopicCounts,
    events_published: AtomicU64,
    /// Events published with no interested subscription.
    events_unclaimed: AtomicU64,
    capacity: usize,
}

impl InMemoryEventBus {
    /// Create a new in-memory event bus with default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a bus that buffers up to `capacity` events per subscriber.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            counts: TopicCounts::default(),
            events_published: AtomicU64::new(0),
            events_unclaimed: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to events matching a filter.
    ///
    /// Only events published after this call are delivered.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, "New subscription created");
        Subscription::new(self.sender.subscribe(), filter, self.counts.clone())
    }

    /// Number of open subscriptions, whatever their topics.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Number of open subscriptions that accept events of `topic`.
    #[must_use]
    pub fn interested_in(&self, topic: EventTopic) -> usize {
        let counts = self.counts.read();
        let wildcard = counts.get(&EventTopic::All).copied().unwrap_or(0);
        if topic == EventTopic::All {
            return wildcard;
        }
        wildcard + counts.get(&topic).copied().unwrap_or(0)
    }

    /// Events published while no subscription accepted their topic.
    #[must_use]
    pub fn events_unclaimed(&self) -> u64 {
        self.events_unclaimed.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: BlockchainEvent) -> usize {
        let topic = event.topic();
        let height = event.height();
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let interested = self.interested_in(topic);
        if interested == 0 {
            self.events_unclaimed.fetch_add(1, Ordering::Relaxed);
            debug!(topic = ?topic, height = ?height, "No subscription for event topic");
            return 0;
        }

        // a send error only means every receiver was dropped since the count
        if self.sender.send(event).is_err() {
            self.events_unclaimed.fetch_add(1, Ordering::Relaxed);
            return 0;
        }
        trace!(topic = ?topic, height = ?height, interested, "Event published");
        interested
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
