//! Reconciliation engine
//!
//! Drains the propagation queue and applies each task to every registered
//! node except the origin, updating acknowledgment state as it goes. Runs
//! on a fixed timer and on explicit `trigger_sync` calls; both paths are
//! serialized through a single-flight guard, so a call that loses the race
//! coalesces into a no-op.
//!
//! Failure semantics: a node that cannot be updated (deregistered mid-pass)
//! is skipped and logged, never aborting the pass. Tasks are attempted at
//! most once; a fresh write re-enqueues.

use crate::hub::broadcast::{Event, EventBus};
use crate::hub::queue::PropagationQueue;
use crate::hub::registry::NodeRegistry;
use crate::hub::store::CanonicalStore;
use crate::hub::Hub;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of one `trigger_sync` call
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SyncOutcome {
    /// False when the call coalesced into an already-running pass
    pub ran: bool,
    pub tasks_applied: usize,
    pub duration_ms: u64,
}

/// Reconciliation engine
pub struct Reconciler {
    registry: Arc<NodeRegistry>,
    store: Arc<CanonicalStore>,
    queue: Arc<PropagationQueue>,
    bus: Arc<EventBus>,
    is_processing: AtomicBool,
    sync_operations: AtomicU64,
    /// Unix millis of the last completed pass, 0 = never
    last_sync: AtomicU64,
}

impl Reconciler {
    pub fn new(
        registry: Arc<NodeRegistry>,
        store: Arc<CanonicalStore>,
        queue: Arc<PropagationQueue>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            registry,
            store,
            queue,
            bus,
            is_processing: AtomicBool::new(false),
            sync_operations: AtomicU64::new(0),
            last_sync: AtomicU64::new(0),
        }
    }

    /// Drain the propagation queue.
    ///
    /// Single-flight: a concurrent caller gets `ran: false` back and the
    /// in-flight pass covers its work. An empty queue returns immediately
    /// with no counter bump and no event, so back-to-back calls with no
    /// intervening writes are observably idempotent.
    pub fn trigger_sync(&self) -> SyncOutcome {
        if self
            .is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("sync already in progress, coalescing");
            return SyncOutcome {
                ran: false,
                tasks_applied: 0,
                duration_ms: 0,
            };
        }

        if self.queue.is_empty() {
            self.is_processing.store(false, Ordering::SeqCst);
            return SyncOutcome {
                ran: true,
                tasks_applied: 0,
                duration_ms: 0,
            };
        }

        let started = Instant::now();
        let mut tasks_applied = 0usize;

        // One task per lock acquisition; writes are never blocked for the
        // duration of the whole drain.
        while let Some(task) = self.queue.pop() {
            // Fresh node snapshot per task: nodes deregistered mid-pass
            // simply stop appearing.
            for node_id in self.registry.node_ids() {
                if task.origin_node_id.as_deref() == Some(node_id.as_str()) {
                    continue;
                }

                if !self
                    .registry
                    .apply_replica(&node_id, &task.key, task.value.clone())
                {
                    tracing::debug!(%node_id, key = %task.key, "propagation skipped, node vanished");
                    continue;
                }

                // Stale tasks still refresh replicas above, but must not
                // acknowledge a superseded generation of the key.
                self.store.acknowledge(&task.key, task.generation, &node_id);

                // A node deregistered between the replica apply and the
                // acknowledge must not linger in the ack set: either the
                // deregistration purge runs after this insert and wins, or
                // the node is already gone here and we retract ourselves.
                if self.registry.get(&node_id).is_none() {
                    self.store.retract_ack(&task.key, &node_id);
                }
            }
            tasks_applied += 1;
        }

        let duration = started.elapsed();
        let duration_ms = duration.as_millis() as u64;
        self.last_sync
            .store(crate::common::timestamp_now_millis(), Ordering::SeqCst);
        self.sync_operations.fetch_add(1, Ordering::SeqCst);
        self.is_processing.store(false, Ordering::SeqCst);

        let total_nodes = self.registry.len();
        let data_entries = self.store.len();
        tracing::info!(tasks_applied, total_nodes, ?duration, "sync completed");

        self.bus.publish(Event::SyncCompleted {
            duration_ms,
            total_nodes,
            data_entries,
        });

        SyncOutcome {
            ran: true,
            tasks_applied,
            duration_ms,
        }
    }

    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }

    /// Completed reconciliation passes since startup
    pub fn sync_operations(&self) -> u64 {
        self.sync_operations.load(Ordering::SeqCst)
    }

    /// Unix millis of the last completed pass
    pub fn last_sync(&self) -> Option<u64> {
        match self.last_sync.load(Ordering::SeqCst) {
            0 => None,
            ts => Some(ts),
        }
    }
}

/// Spawn the periodic reconciliation task
pub fn spawn_interval(hub: Arc<Hub>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let outcome = hub.trigger_sync();
            if outcome.ran && outcome.tasks_applied > 0 {
                tracing::debug!(tasks = outcome.tasks_applied, "periodic sync drained queue");
            }
        }
    })
}
