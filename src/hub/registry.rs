//! Node registry
//!
//! Tracks the set of registered replica nodes:
//! - node_id → category, status, local replica
//! - status flips driven by the external heartbeat collaborator
//! - registration sequence for deterministic iteration order
//!
//! A node's `local_replica` is written only by the reconciler, or by the
//! canonical write path when the node is the origin of the write.

use crate::common::{timestamp_now_millis, NodeStatus, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// A registered replica node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    pub category: String,
    pub status: NodeStatus,
    pub local_replica: HashMap<String, Value>,
    pub last_synced_at: Option<u64>,
    /// Registration sequence, used as the iteration tie-break
    pub seq: u64,
}

#[derive(Default)]
struct RegistryInner {
    nodes: HashMap<String, Node>,
    next_seq: u64,
}

/// Node registry
#[derive(Default)]
pub struct NodeRegistry {
    inner: RwLock<RegistryInner>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new node in `active` status with an empty replica.
    pub fn register(&self, node_id: &str, category: &str) -> Result<Node> {
        let mut inner = self.inner.write().unwrap();
        if inner.nodes.contains_key(node_id) {
            return Err(crate::Error::DuplicateNode(node_id.to_string()));
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;

        let node = Node {
            id: node_id.to_string(),
            category: category.to_string(),
            status: NodeStatus::Active,
            local_replica: HashMap::new(),
            last_synced_at: None,
            seq,
        };
        inner.nodes.insert(node_id.to_string(), node.clone());

        tracing::info!(node_id, category, "node registered");
        Ok(node)
    }

    /// Get a snapshot of a node
    pub fn get(&self, node_id: &str) -> Option<Node> {
        self.inner.read().unwrap().nodes.get(node_id).cloned()
    }

    /// List all nodes in registration order
    pub fn list(&self) -> Vec<Node> {
        let inner = self.inner.read().unwrap();
        let mut nodes: Vec<Node> = inner.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.seq);
        nodes
    }

    /// List nodes with the given category, in registration order
    pub fn list_by_category(&self, category: &str) -> Vec<Node> {
        let inner = self.inner.read().unwrap();
        let mut nodes: Vec<Node> = inner
            .nodes
            .values()
            .filter(|n| n.category == category)
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.seq);
        nodes
    }

    /// Current node ids in registration order (snapshot for the reconciler)
    pub fn node_ids(&self) -> Vec<String> {
        let inner = self.inner.read().unwrap();
        let mut ids: Vec<(u64, String)> = inner
            .nodes
            .values()
            .map(|n| (n.seq, n.id.clone()))
            .collect();
        ids.sort_by_key(|(seq, _)| *seq);
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Flip a node's status (heartbeat collaborator entry point).
    /// Returns false if the node is not registered.
    pub fn set_status(&self, node_id: &str, status: NodeStatus) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.nodes.get_mut(node_id) {
            Some(node) => {
                if node.status != status {
                    tracing::info!(node_id, %status, "node status changed");
                }
                node.status = status;
                true
            }
            None => false,
        }
    }

    /// Remove a node. Idempotent: returns false if it was not registered.
    ///
    /// Callers must purge the node from canonical acknowledgment sets
    /// before calling this (the Hub facade does).
    pub fn deregister(&self, node_id: &str) -> bool {
        let removed = self.inner.write().unwrap().nodes.remove(node_id).is_some();
        if removed {
            tracing::info!(node_id, "node deregistered");
        }
        removed
    }

    /// Reconciler-only replica write. Returns false if the node vanished.
    pub fn apply_replica(&self, node_id: &str, key: &str, value: Value) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.nodes.get_mut(node_id) {
            Some(node) => {
                node.local_replica.insert(key.to_string(), value);
                node.last_synced_at = Some(timestamp_now_millis());
                true
            }
            None => false,
        }
    }

    /// Canonical write-path replica write, allowed only for the origin node.
    /// Best-effort: an unknown origin is ignored.
    pub fn write_origin_replica(&self, node_id: &str, key: &str, value: Value) -> bool {
        self.apply_replica(node_id, key, value)
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_and_get() {
        let registry = NodeRegistry::new();
        let node = registry.register("node-1", "cache").unwrap();
        assert_eq!(node.status, NodeStatus::Active);
        assert!(node.local_replica.is_empty());

        let fetched = registry.get("node-1").unwrap();
        assert_eq!(fetched.category, "cache");
        assert!(registry.get("node-2").is_none());
    }

    #[test]
    fn test_duplicate_registration() {
        let registry = NodeRegistry::new();
        registry.register("node-1", "cache").unwrap();
        let err = registry.register("node-1", "worker").unwrap_err();
        assert!(matches!(err, crate::Error::DuplicateNode(_)));
    }

    #[test]
    fn test_list_by_category_ordered() {
        let registry = NodeRegistry::new();
        registry.register("c", "cache").unwrap();
        registry.register("a", "worker").unwrap();
        registry.register("b", "cache").unwrap();

        let cache: Vec<String> = registry
            .list_by_category("cache")
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(cache, vec!["c", "b"]);

        assert_eq!(registry.node_ids(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_deregister_idempotent() {
        let registry = NodeRegistry::new();
        registry.register("node-1", "cache").unwrap();

        assert!(registry.deregister("node-1"));
        assert!(!registry.deregister("node-1"));
        assert!(!registry.deregister("never-existed"));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_set_status() {
        let registry = NodeRegistry::new();
        registry.register("node-1", "cache").unwrap();

        assert!(registry.set_status("node-1", NodeStatus::Degraded));
        assert_eq!(registry.get("node-1").unwrap().status, NodeStatus::Degraded);
        assert!(!registry.set_status("missing", NodeStatus::Offline));
    }

    #[test]
    fn test_apply_replica() {
        let registry = NodeRegistry::new();
        registry.register("node-1", "cache").unwrap();

        assert!(registry.apply_replica("node-1", "k", json!("v")));
        let node = registry.get("node-1").unwrap();
        assert_eq!(node.local_replica.get("k").unwrap(), &json!("v"));
        assert!(node.last_synced_at.is_some());

        assert!(!registry.apply_replica("missing", "k", json!("v")));
    }
}
