//! Canonical store
//!
//! The authoritative key → value mapping. Each entry carries the writer's
//! identity and the set of nodes confirmed to hold the current value.
//!
//! Writes are last-writer-wins by arrival order at the store: the store's
//! write lock is the linearization point for a key, and every write starts
//! a fresh acknowledgment set. A store-global `generation` counter stamps
//! each write so the reconciler cannot acknowledge a superseded value
//! (two writes can land in the same millisecond, so `written_at` alone is
//! not a safe guard).

use crate::common::timestamp_now_millis;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

/// A canonical entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,
    pub value: Value,
    pub origin_node_id: Option<String>,
    /// Unix millis of the write
    pub written_at: u64,
    /// Store-global write counter, the acknowledgment guard
    pub generation: u64,
    pub acknowledged_by: HashSet<String>,
}

#[derive(Default)]
struct StoreInner {
    entries: HashMap<String, Entry>,
    next_generation: u64,
}

/// Canonical store
#[derive(Default)]
pub struct CanonicalStore {
    inner: RwLock<StoreInner>,
}

impl CanonicalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a value, superseding any prior entry for the key.
    ///
    /// The acknowledgment set starts as `{origin}` when an origin is given,
    /// else empty. An unknown origin id is accepted as-is; acknowledgment
    /// bookkeeping is best-effort and never rejects a write.
    pub fn write(&self, key: &str, value: Value, origin_node_id: Option<&str>) -> Entry {
        let mut inner = self.inner.write().unwrap();
        let generation = inner.next_generation;
        inner.next_generation += 1;

        let mut acknowledged_by = HashSet::new();
        if let Some(origin) = origin_node_id {
            acknowledged_by.insert(origin.to_string());
        }

        let entry = Entry {
            key: key.to_string(),
            value,
            origin_node_id: origin_node_id.map(|s| s.to_string()),
            written_at: timestamp_now_millis(),
            generation,
            acknowledged_by,
        };
        inner.entries.insert(key.to_string(), entry.clone());
        entry
    }

    /// Read the current entry for a key
    pub fn read(&self, key: &str) -> Option<Entry> {
        self.inner.read().unwrap().entries.get(key).cloned()
    }

    /// Substring search over keys and serialized values.
    ///
    /// Case policy: matching is case-insensitive. Results are a snapshot
    /// of the store at call time, sorted by key for determinism.
    pub fn search(&self, query: &str) -> Vec<Entry> {
        let needle = query.to_lowercase();
        let inner = self.inner.read().unwrap();
        let mut matches: Vec<Entry> = inner
            .entries
            .values()
            .filter(|e| {
                e.key.to_lowercase().contains(&needle)
                    || e.value.to_string().to_lowercase().contains(&needle)
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| a.key.cmp(&b.key));
        matches
    }

    /// Record that a node holds the value of the given generation.
    ///
    /// A stale generation (the key was overwritten or deleted since the
    /// task was enqueued) is a no-op; the acknowledgment set of a live
    /// generation only ever grows.
    pub fn acknowledge(&self, key: &str, generation: u64, node_id: &str) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.entries.get_mut(key) {
            Some(entry) if entry.generation == generation => {
                entry.acknowledged_by.insert(node_id.to_string());
                true
            }
            _ => false,
        }
    }

    /// Withdraw a single acknowledgment (reconciler compensation when a
    /// node deregisters between replica apply and acknowledge)
    pub fn retract_ack(&self, key: &str, node_id: &str) {
        let mut inner = self.inner.write().unwrap();
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.acknowledged_by.remove(node_id);
        }
    }

    /// Explicitly delete a key. Returns false if it was absent.
    pub fn remove(&self, key: &str) -> bool {
        self.inner.write().unwrap().entries.remove(key).is_some()
    }

    /// Strip a node from every acknowledgment set (deregistration)
    pub fn purge_acks(&self, node_id: &str) {
        let mut inner = self.inner.write().unwrap();
        for entry in inner.entries.values_mut() {
            entry.acknowledged_by.remove(node_id);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries, sorted by key (persistence collaborator)
    pub fn snapshot_entries(&self) -> Vec<Entry> {
        let inner = self.inner.read().unwrap();
        let mut entries: Vec<Entry> = inner.entries.values().cloned().collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Load entries, keeping the generation counter ahead of every entry
    pub fn restore_entries(&self, entries: Vec<Entry>) {
        let mut inner = self.inner.write().unwrap();
        for entry in entries {
            inner.next_generation = inner.next_generation.max(entry.generation + 1);
            inner.entries.insert(entry.key.clone(), entry);
        }
    }
}
