//! Event bus for publishing cycles
//!
//! Events are distributed over `tokio::sync::broadcast`. Emission never blocks:
//! without subscribers events are dropped, and lagging subscribers miss the
//! oldest events rather than slowing the cycle down.
//!
//! `OwnerStale` is the signal read-side caches (dashboards, analytics) listen
//! for; it is emitted once per processed post.
//!
//! ```no_run
//! use libcastboard::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let event_bus = EventBus::new(100);
//! let mut receiver = event_bus.subscribe();
//!
//! event_bus.emit(Event::OwnerStale {
//!     owner: "alice".to_string(),
//! });
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// `capacity` is the per-subscriber buffer before old events are dropped
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: Event) {
        // send() only fails when nobody is listening
        let _ = self.sender.send(event);
    }

    /// Number of active subscribers; for diagnostics only
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    CycleStarted {
        cycle_id: String,
        trigger: String,
        /// Number of due posts selected
        due: usize,
    },

    PostPublished {
        post_id: String,
        owner: String,
    },

    PostPublishFailed {
        post_id: String,
        owner: String,
        reason: String,
    },

    /// Cached aggregates for this owner must be recomputed
    OwnerStale {
        owner: String,
    },

    CycleCompleted {
        cycle_id: String,
        published: usize,
        failed: usize,
        skipped: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_emission_and_subscription() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        event_bus.emit(Event::PostPublished {
            post_id: "p1".to_string(),
            owner: "alice".to_string(),
        });

        match receiver.recv().await.unwrap() {
            Event::PostPublished { post_id, owner } => {
                assert_eq!(post_id, "p1");
                assert_eq!(owner, "alice");
            }
            other => panic!("Wrong event type received: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();

        let event = Event::OwnerStale {
            owner: "bob".to_string(),
        };
        event_bus.emit(event.clone());

        assert_eq!(receiver1.recv().await.unwrap(), event);
        assert_eq!(receiver2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_no_subscribers() {
        let event_bus = EventBus::new(10);

        // Should not panic or block
        event_bus.emit(Event::CycleStarted {
            cycle_id: "c1".to_string(),
            trigger: "test".to_string(),
            due: 0,
        });

        assert_eq!(event_bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_does_not_block() {
        let event_bus = EventBus::new(2);
        let mut receiver = event_bus.subscribe();

        for i in 0..5 {
            event_bus.emit(Event::OwnerStale {
                owner: format!("owner-{}", i),
            });
        }

        assert!(matches!(
            receiver.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::PostPublishFailed {
            post_id: "p9".to_string(),
            owner: "alice".to_string(),
            reason: "No targets selected".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"post_publish_failed""#));
        assert!(json.contains("No targets selected"));

        let deserialized: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}
