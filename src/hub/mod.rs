//! Replicated coordination hub
//!
//! The hub is responsible for:
//! - The canonical key-value namespace (key → value, writer, acks)
//! - The node registry (replica targets with their local copies)
//! - Asynchronous write propagation (FIFO queue + single reconciler)
//! - Observer fan-out (live change feed to subscribers)
//! - Introspection (stats, search, snapshots)

pub mod broadcast;
pub mod http;
pub mod queue;
pub mod reconcile;
pub mod registry;
pub mod server;
pub mod store;

pub use broadcast::{Event, EventBus};
pub use queue::{PropagationQueue, PropagationTask};
pub use reconcile::{Reconciler, SyncOutcome};
pub use registry::{Node, NodeRegistry};
pub use server::HubServer;
pub use store::{CanonicalStore, Entry};

use crate::common::{timestamp_now_millis, validate_key, HubConfig, NodeStatus, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast::Receiver;

/// Aggregated hub counters, a pure read
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub total_nodes: usize,
    pub active_connections: usize,
    pub data_entries: usize,
    pub sync_operations: u64,
    /// Unix millis of the last completed reconciliation pass
    pub last_sync: Option<u64>,
    pub queue_depth: usize,
    pub is_processing: bool,
}

/// A live observer subscription
pub struct Subscription {
    pub connection_id: String,
    /// Sent to this subscriber before any broadcast events
    pub welcome: Event,
    pub rx: Receiver<Event>,
}

/// Point-in-time export for the external persistence collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubSnapshot {
    pub taken_at: u64,
    pub entries: Vec<Entry>,
}

/// The replicated coordination hub
pub struct Hub {
    registry: Arc<NodeRegistry>,
    store: Arc<CanonicalStore>,
    queue: Arc<PropagationQueue>,
    bus: Arc<EventBus>,
    reconciler: Reconciler,
    /// Serializes store mutation + enqueue so queue order always matches
    /// the store's generation order
    write_lock: std::sync::Mutex<()>,
}

impl Hub {
    pub fn new(config: &HubConfig) -> Self {
        let registry = Arc::new(NodeRegistry::new());
        let store = Arc::new(CanonicalStore::new());
        let queue = Arc::new(PropagationQueue::new());
        let bus = Arc::new(EventBus::new(config.event_buffer));
        let reconciler = Reconciler::new(
            registry.clone(),
            store.clone(),
            queue.clone(),
            bus.clone(),
        );
        Self {
            registry,
            store,
            queue,
            bus,
            reconciler,
            write_lock: std::sync::Mutex::new(()),
        }
    }

    // === Registry operations ===

    pub fn register_node(&self, node_id: &str, category: &str) -> Result<Node> {
        self.registry.register(node_id, category)
    }

    pub fn get_node(&self, node_id: &str) -> Option<Node> {
        self.registry.get(node_id)
    }

    pub fn list_nodes(&self) -> Vec<Node> {
        self.registry.list()
    }

    pub fn list_nodes_by_category(&self, category: &str) -> Vec<Node> {
        self.registry.list_by_category(category)
    }

    /// Heartbeat collaborator entry point
    pub fn report_status(&self, node_id: &str, status: NodeStatus) -> bool {
        self.registry.set_status(node_id, status)
    }

    /// Deregister a node. Idempotent. The node is removed from the
    /// registry first and then purged from every acknowledgment set, so a
    /// reconciler acknowledgment racing with removal is cleaned up by the
    /// purge; no canonical entry keeps referencing a removed node.
    pub fn deregister_node(&self, node_id: &str) -> bool {
        let removed = self.registry.deregister(node_id);
        self.store.purge_acks(node_id);
        removed
    }

    // === Canonical store operations ===

    /// Write a value. Visibility is immediate at the canonical layer;
    /// propagation to replicas is deferred to the reconciler. The origin
    /// node's own replica is written directly here, as the one exception
    /// to the reconciler's exclusive replica ownership.
    pub fn write(&self, key: &str, value: Value, origin_node_id: Option<&str>) -> Result<Entry> {
        validate_key(key)?;

        // Store write and enqueue are one atomic step: a task enqueued out
        // of generation order would let the reconciler apply a superseded
        // value last and leave replicas diverged from the canonical entry.
        let _guard = self.write_lock.lock().unwrap();

        let entry = self.store.write(key, value.clone(), origin_node_id);
        if let Some(origin) = origin_node_id {
            // Best-effort: an unknown origin does not fail the write
            self.registry.write_origin_replica(origin, key, value.clone());
        }

        self.queue.push(PropagationTask {
            key: key.to_string(),
            value: value.clone(),
            origin_node_id: origin_node_id.map(|s| s.to_string()),
            generation: entry.generation,
            enqueued_at: entry.written_at,
        });

        self.bus.publish(Event::DataUpdated {
            key: key.to_string(),
            value,
            origin_node_id: origin_node_id.map(|s| s.to_string()),
            timestamp: chrono::Utc::now().timestamp_millis(),
        });

        Ok(entry)
    }

    pub fn read(&self, key: &str) -> Option<Entry> {
        self.store.read(key)
    }

    /// Delete a key and drop any pending propagation for it
    pub fn delete(&self, key: &str) -> bool {
        let _guard = self.write_lock.lock().unwrap();
        let removed = self.store.remove(key);
        let purged = self.queue.purge_key(key);
        if purged > 0 {
            tracing::debug!(key, purged, "dropped pending propagation tasks");
        }
        if removed {
            self.bus.publish(Event::KeyDeleted {
                key: key.to_string(),
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
        }
        removed
    }

    pub fn search(&self, query: &str) -> Vec<Entry> {
        self.store.search(query)
    }

    // === Reconciliation ===

    pub fn trigger_sync(&self) -> SyncOutcome {
        self.reconciler.trigger_sync()
    }

    // === Observation ===

    pub fn subscribe(&self) -> Subscription {
        let rx = self.bus.subscribe();
        let connection_id = uuid::Uuid::new_v4().to_string();
        let welcome = Event::Welcome {
            connection_id: connection_id.clone(),
            stats: self.stats(),
        };
        tracing::debug!(%connection_id, "observer subscribed");
        Subscription {
            connection_id,
            welcome,
            rx,
        }
    }

    pub fn stats(&self) -> Stats {
        Stats {
            total_nodes: self.registry.len(),
            active_connections: self.bus.connections(),
            data_entries: self.store.len(),
            sync_operations: self.reconciler.sync_operations(),
            last_sync: self.reconciler.last_sync(),
            queue_depth: self.queue.depth(),
            is_processing: self.reconciler.is_processing(),
        }
    }

    // === Persistence collaborator boundary ===

    pub fn snapshot(&self) -> HubSnapshot {
        HubSnapshot {
            taken_at: timestamp_now_millis(),
            entries: self.store.snapshot_entries(),
        }
    }

    pub fn restore(&self, snapshot: HubSnapshot) {
        let count = snapshot.entries.len();
        self.store.restore_entries(snapshot.entries);
        tracing::info!(entries = count, "restored canonical entries from snapshot");
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(&HubConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_visibility() {
        let hub = Hub::default();
        hub.write("k", json!("v"), None).unwrap();
        assert_eq!(hub.read("k").unwrap().value, json!("v"));
    }

    #[test]
    fn test_write_rejects_invalid_key() {
        let hub = Hub::default();
        assert!(hub.write("", json!(1), None).is_err());
    }

    #[test]
    fn test_origin_replica_written_directly() {
        let hub = Hub::default();
        hub.register_node("a", "cache").unwrap();
        hub.write("k", json!("v"), Some("a")).unwrap();

        let node = hub.get_node("a").unwrap();
        assert_eq!(node.local_replica.get("k").unwrap(), &json!("v"));
    }

    #[test]
    fn test_write_with_unknown_origin_succeeds() {
        let hub = Hub::default();
        let entry = hub.write("k", json!("v"), Some("ghost")).unwrap();
        assert!(entry.acknowledged_by.contains("ghost"));
    }

    #[test]
    fn test_delete_purges_queue() {
        let hub = Hub::default();
        hub.write("k", json!(1), None).unwrap();
        assert_eq!(hub.stats().queue_depth, 1);

        assert!(hub.delete("k"));
        assert_eq!(hub.stats().queue_depth, 0);
        assert!(hub.read("k").is_none());
        assert!(!hub.delete("k"));
    }

    #[test]
    fn test_deregister_purges_acks() {
        let hub = Hub::default();
        hub.register_node("a", "cache").unwrap();
        hub.write("k", json!(1), Some("a")).unwrap();

        assert!(hub.deregister_node("a"));
        assert!(hub.read("k").unwrap().acknowledged_by.is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_welcome_and_updates() {
        let hub = Hub::default();
        let mut sub = hub.subscribe();

        match &sub.welcome {
            Event::Welcome { connection_id, stats } => {
                assert_eq!(connection_id, &sub.connection_id);
                assert_eq!(stats.active_connections, 1);
            }
            other => panic!("unexpected welcome: {:?}", other),
        }

        hub.write("k", json!("v"), None).unwrap();
        match sub.rx.recv().await.unwrap() {
            Event::DataUpdated { key, .. } => assert_eq!(key, "k"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_stats_shape() {
        let hub = Hub::default();
        hub.register_node("a", "cache").unwrap();
        hub.write("k", json!(1), None).unwrap();

        let stats = hub.stats();
        assert_eq!(stats.total_nodes, 1);
        assert_eq!(stats.data_entries, 1);
        assert_eq!(stats.queue_depth, 1);
        assert_eq!(stats.sync_operations, 0);
        assert!(stats.last_sync.is_none());
        assert!(!stats.is_processing);
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let hub = Hub::default();
        hub.write("a", json!(1), None).unwrap();
        hub.write("b", json!({"nested": true}), None).unwrap();

        let snapshot = hub.snapshot();
        assert_eq!(snapshot.entries.len(), 2);

        let fresh = Hub::default();
        fresh.restore(snapshot);
        assert_eq!(fresh.read("b").unwrap().value, json!({"nested": true}));
    }
}
