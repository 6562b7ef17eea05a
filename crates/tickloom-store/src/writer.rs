//! The background writer: persistence off the render path.
//!
//! The orchestrator never touches SQLite. It enqueues [`WriteOp`]s into
//! a bounded channel; a dedicated thread drains the channel greedily
//! and applies each drain as one batch. Enqueueing is `try_send` —
//! when the channel is full the op is handed back to the caller, which
//! records a `persistence_lagging` metric and decides what to retry
//! (events are kept, metrics may be shed).

use std::thread::JoinHandle;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

use tickloom_anim::Tick;
use tickloom_coord::CoordinationEvent;
use tickloom_data::Sample;

use crate::store::{AnimationRow, PlanRow, Store};
use crate::StoreError;

/// Default bound on the write queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// One unit of persistence work.
#[derive(Debug)]
pub enum WriteOp {
    /// Events from one tick; written in a single transaction.
    Events(Vec<CoordinationEvent>),
    AnimationUpsert(AnimationRow),
    PlanUpsert(PlanRow),
    Metric {
        tick: Tick,
        kind: String,
        value: f64,
    },
    DataSamples(Vec<Sample>),
    Checkpoint {
        tick: Tick,
        snapshot: Vec<u8>,
    },
    RetentionSweep {
        horizon_tick: Tick,
    },
    /// Poison pill: finish pending work and exit.
    Shutdown,
}

impl WriteOp {
    /// `true` for ops that may be shed under pressure without losing
    /// engine history.
    pub fn is_sheddable(&self) -> bool {
        matches!(self, Self::Metric { .. })
    }
}

/// Why an op could not be queued.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    /// The queue is at capacity; the op is handed back so the caller
    /// can shed or retry it next tick.
    #[error("persistence queue full")]
    Full(WriteOp),
    /// The writer thread has exited.
    #[error("persistence writer has shut down")]
    Gone,
}

/// Handle to the writer thread.
pub struct StoreWriter {
    sender: Sender<WriteOp>,
    handle: Option<JoinHandle<()>>,
}

impl StoreWriter {
    /// Spawns the writer thread over an opened store.
    pub fn spawn(store: Store) -> Self {
        Self::spawn_with_capacity(store, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn spawn_with_capacity(store: Store, capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        let handle = std::thread::Builder::new()
            .name("tickloom-store".to_string())
            .spawn(move || writer_loop(store, receiver))
            .expect("spawning the persistence writer thread");
        Self {
            sender,
            handle: Some(handle),
        }
    }

    /// Queues an op without blocking.
    ///
    /// # Errors
    /// [`EnqueueError::Full`] hands the op back when the queue is at
    /// capacity (caller records lagging and decides what to retry);
    /// [`EnqueueError::Gone`] when the thread has exited.
    pub fn enqueue(&self, op: WriteOp) -> Result<(), EnqueueError> {
        match self.sender.try_send(op) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(op)) => Err(EnqueueError::Full(op)),
            Err(TrySendError::Disconnected(_)) => Err(EnqueueError::Gone),
        }
    }

    /// Current queue depth, for lagging detection.
    pub fn queue_len(&self) -> usize {
        self.sender.len()
    }

    /// Sends the poison pill and joins the thread, flushing pending
    /// work.
    pub fn shutdown(mut self) {
        let _ = self.sender.send(WriteOp::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StoreWriter {
    fn drop(&mut self) {
        // Best-effort flush if the caller forgot an explicit shutdown.
        let _ = self.sender.try_send(WriteOp::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for StoreWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreWriter")
            .field("queued", &self.sender.len())
            .finish()
    }
}

fn writer_loop(mut store: Store, receiver: Receiver<WriteOp>) {
    tracing::debug!("persistence writer started");
    'outer: while let Ok(first) = receiver.recv() {
        // Greedy drain: whatever has accumulated becomes one batch.
        let mut batch = vec![first];
        while let Ok(op) = receiver.try_recv() {
            batch.push(op);
        }
        for op in batch {
            match op {
                WriteOp::Shutdown => {
                    break 'outer;
                }
                other => {
                    if let Err(err) = apply(&mut store, other) {
                        tracing::error!(error = %err, "persistence write failed");
                    }
                }
            }
        }
    }
    tracing::debug!("persistence writer stopped");
}

fn apply(store: &mut Store, op: WriteOp) -> Result<(), StoreError> {
    match op {
        WriteOp::Events(events) => store.append_events(&events),
        WriteOp::AnimationUpsert(row) => store.upsert_animation(&row),
        WriteOp::PlanUpsert(row) => store.upsert_plan(&row),
        WriteOp::Metric { tick, kind, value } => {
            store.record_metric(tick, &kind, value)
        }
        WriteOp::DataSamples(samples) => store.append_data_samples(&samples),
        WriteOp::Checkpoint { tick, snapshot } => {
            store.save_checkpoint(tick, &snapshot)
        }
        WriteOp::RetentionSweep { horizon_tick } => {
            store.retention_sweep(horizon_tick).map(|_| ())
        }
        WriteOp::Shutdown => Ok(()),
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tickloom_coord::{EventKind, PrimitiveId};

    #[test]
    fn test_writer_flushes_on_shutdown() {
        // tempfile-free: use a unique path under the target dir.
        let path = std::env::temp_dir()
            .join(format!("tickloom-writer-test-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        let writer = StoreWriter::spawn(Store::open(&path).unwrap());
        writer
            .enqueue(WriteOp::Events(vec![CoordinationEvent::new(
                3,
                EventKind::SyncTriggered,
                PrimitiveId::new("s"),
            )]))
            .unwrap();
        writer
            .enqueue(WriteOp::Metric {
                tick: 3,
                kind: "frame_missed".to_string(),
                value: 1.0,
            })
            .unwrap();
        writer.shutdown();

        let store = Store::open(&path).unwrap();
        let events = store.events_in_range(0, 10).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].primitive_id, PrimitiveId::new("s"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_enqueue_returns_op_when_full() {
        let path = std::env::temp_dir()
            .join(format!("tickloom-writer-full-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);

        // Capacity 1 and a writer that is likely busy; fill the queue
        // until try_send reports Full, then verify the op comes back.
        let writer =
            StoreWriter::spawn_with_capacity(Store::open(&path).unwrap(), 1);
        let mut returned = None;
        for _ in 0..10_000 {
            match writer.enqueue(WriteOp::Metric {
                tick: 0,
                kind: "x".to_string(),
                value: 0.0,
            }) {
                Ok(()) => continue,
                Err(EnqueueError::Full(op)) => {
                    returned = Some(op);
                    break;
                }
                Err(EnqueueError::Gone) => panic!("writer died"),
            }
        }
        if let Some(op) = returned {
            assert!(op.is_sheddable());
        }
        writer.shutdown();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_sheddable_classification() {
        assert!(WriteOp::Metric {
            tick: 0,
            kind: "m".into(),
            value: 0.0
        }
        .is_sheddable());
        assert!(!WriteOp::Events(vec![]).is_sheddable());
        assert!(!WriteOp::Checkpoint {
            tick: 0,
            snapshot: vec![]
        }
        .is_sheddable());
    }
}
