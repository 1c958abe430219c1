//! Propagation queue
//!
//! FIFO queue of pending replication work, one task per write. Queue order
//! is the total order of writes as observed by the store. The reconciler
//! takes the lock only to pop a single task, never across a whole drain.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A unit of pending replication work derived from one write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagationTask {
    pub key: String,
    pub value: Value,
    pub origin_node_id: Option<String>,
    /// Generation of the canonical entry this task was derived from
    pub generation: u64,
    pub enqueued_at: u64,
}

/// Propagation queue
#[derive(Default)]
pub struct PropagationQueue {
    inner: Mutex<VecDeque<PropagationTask>>,
}

impl PropagationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: PropagationTask) {
        self.inner.lock().unwrap().push_back(task);
    }

    /// Pop the oldest task. One lock acquisition per task.
    pub fn pop(&self) -> Option<PropagationTask> {
        self.inner.lock().unwrap().pop_front()
    }

    /// Drop all pending tasks for a key (explicit delete support).
    /// Returns the number of tasks removed.
    pub fn purge_key(&self, key: &str) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.len();
        inner.retain(|t| t.key != key);
        before - inner.len()
    }

    pub fn depth(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::timestamp_now_millis;
    use serde_json::json;

    fn task(key: &str, generation: u64) -> PropagationTask {
        PropagationTask {
            key: key.to_string(),
            value: json!("v"),
            origin_node_id: None,
            generation,
            enqueued_at: timestamp_now_millis(),
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = PropagationQueue::new();
        queue.push(task("a", 0));
        queue.push(task("b", 1));
        queue.push(task("a", 2));

        assert_eq!(queue.depth(), 3);
        assert_eq!(queue.pop().unwrap().generation, 0);
        assert_eq!(queue.pop().unwrap().generation, 1);
        assert_eq!(queue.pop().unwrap().generation, 2);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_purge_key() {
        let queue = PropagationQueue::new();
        queue.push(task("a", 0));
        queue.push(task("b", 1));
        queue.push(task("a", 2));

        assert_eq!(queue.purge_key("a"), 2);
        assert_eq!(queue.depth(), 1);
        assert_eq!(queue.pop().unwrap().key, "b");
    }
}
