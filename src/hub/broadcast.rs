//! Observer broadcast
//!
//! Fan-out of hub events to live subscribers over a bounded tokio
//! broadcast channel. Slow subscribers lag and get disconnected by the
//! channel instead of back-pressuring writers; publishing with no
//! subscribers is a no-op. Transport handlers (ws/sse) each hold a
//! receiver and drop it on disconnect.

use crate::hub::Stats;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// Events pushed to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// Sent once per connection at subscribe time
    Welcome { connection_id: String, stats: Stats },
    DataUpdated {
        key: String,
        value: Value,
        origin_node_id: Option<String>,
        timestamp: i64,
    },
    KeyDeleted { key: String, timestamp: i64 },
    SyncCompleted {
        duration_ms: u64,
        total_nodes: usize,
        data_entries: usize,
    },
}

/// Event bus for observer fan-out
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// `buffer` bounds the per-subscriber backlog
    pub fn new(buffer: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer.max(1));
        Self { tx }
    }

    /// Subscribe to the live event stream
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Push an event to every live subscriber
    pub fn publish(&self, event: Event) {
        // Err means no live subscribers, which is fine
        let _ = self.tx.send(event);
    }

    /// Number of live subscribers
    pub fn connections(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_stats() -> Stats {
        Stats {
            total_nodes: 1,
            active_connections: 0,
            data_entries: 2,
            sync_operations: 3,
            last_sync: None,
            queue_depth: 0,
            is_processing: false,
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_noop() {
        let bus = EventBus::new(8);
        assert_eq!(bus.connections(), 0);
        bus.publish(Event::KeyDeleted {
            key: "k".into(),
            timestamp: 0,
        });
    }

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.connections(), 1);

        bus.publish(Event::DataUpdated {
            key: "greeting".into(),
            value: json!("hi"),
            origin_node_id: Some("node-a".into()),
            timestamp: 42,
        });

        match rx.recv().await.unwrap() {
            Event::DataUpdated { key, value, .. } => {
                assert_eq!(key, "greeting");
                assert_eq!(value, json!("hi"));
            }
            other => panic!("unexpected event: {:?}", other),
        }

        drop(rx);
        assert_eq!(bus.connections(), 0);
    }

    #[test]
    fn test_event_serialization_tag() {
        let event = Event::Welcome {
            connection_id: "c-1".into(),
            stats: sample_stats(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "welcome");
        assert_eq!(json["stats"]["data_entries"], 2);

        let event = Event::SyncCompleted {
            duration_ms: 5,
            total_nodes: 2,
            data_entries: 7,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "sync_completed");
        assert_eq!(json["duration_ms"], 5);
    }
}
