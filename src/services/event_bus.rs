//! EventBus service for domain event distribution.
//!
//! Broadcast-based and non-blocking: publishers never wait for consumers, and
//! a publish with no subscribers is simply dropped.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::broadcast;

use crate::domain::models::events::EventEnvelope;
use crate::domain::models::WardenEvent;

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Capacity of the broadcast channel. Slow subscribers lag past this.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Broadcast bus for [`WardenEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    sequence: AtomicU64,
}

impl EventBus {
    /// Create a new EventBus with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Publish an event.
    pub fn publish(&self, event: WardenEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence,
            timestamp: Utc::now(),
            event,
        };
        // Ignore send errors - may have no subscribers
        let _ = self.sender.send(envelope);
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Number of events published so far.
    pub fn published_count(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_assigns_sequence() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.publish(WardenEvent::ReconcileFailed {
            tenant: "a".to_string(),
            error: "boom".to_string(),
        });
        bus.publish(WardenEvent::ReconcileFailed {
            tenant: "b".to_string(),
            error: "boom".to_string(),
        });

        assert_eq!(rx.recv().await.unwrap().sequence, 0);
        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert_eq!(bus.published_count(), 2);
    }

    #[test]
    fn test_publish_without_subscribers_does_not_fail() {
        let bus = EventBus::default();
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(WardenEvent::ReconcileFailed {
            tenant: "a".to_string(),
            error: "boom".to_string(),
        });
        assert_eq!(bus.published_count(), 1);
    }
}
