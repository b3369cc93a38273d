//! In-process realtime transport.
//!
//! ```text
//! OrderService ──broadcast──▶ FanoutRouter ──publish──▶ TopicHub
//!                                                        ├── order:<id>  ─▶ Sender ─▶ viewers of that order
//!                                                        ├── user:<id>   ─▶ Sender ─▶ the owner's connections
//!                                                        └── role:admin  ─▶ Sender ─▶ every admin connection
//! ```
//!
//! One broadcast channel per live topic. A topic appears with its first
//! subscriber and is pruned once its last receiver is released.

use crate::fanout::{Topic, Transport, TransportError};
use async_trait::async_trait;
use dashmap::DashMap;
use mercato_shared::OrderChangedEvent;
use tokio::sync::broadcast;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

pub struct TopicHub {
    topics: DashMap<Topic, broadcast::Sender<OrderChangedEvent>>,
    capacity: usize,
}

impl TopicHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of topics with at least one live subscriber
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics.get(topic).map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for TopicHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl Transport for TopicHub {
    fn subscribe(&self, topic: &Topic) -> broadcast::Receiver<OrderChangedEvent> {
        self.topics
            .entry(topic.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    fn release(&self, topic: &Topic) {
        // Holds the shard lock, so a concurrent subscribe cannot slip in between
        self.topics.remove_if(topic, |_, tx| tx.receiver_count() == 0);
    }

    async fn publish(&self, topic: &Topic, event: &OrderChangedEvent) -> Result<usize, TransportError> {
        let Some(tx) = self.topics.get(topic) else {
            return Ok(0);
        };
        // No receivers left is not a failure for best-effort delivery
        Ok(tx.send(event.clone()).unwrap_or(0))
    }
}
