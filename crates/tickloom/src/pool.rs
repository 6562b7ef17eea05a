//! The frame pre-compute pool.
//!
//! Worker threads pull `(tick, snapshot)` tasks from a bounded channel,
//! compute the frame purely from the snapshot, and push the result
//! back. Tasks carry an `Arc` of the snapshot, so re-seeding after an
//! invalidation is just "newer tasks carry the newer snapshot" — the
//! cache rejects anything computed from a stale one.
//!
//! Shutdown is a poison pill per worker, the way the room actors in a
//! game server drain their command channels before exiting.

use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

use tickloom_anim::Tick;

use crate::snapshot::{EngineSnapshot, FrameState};

/// A unit of pre-computation.
enum Task {
    Compute {
        tick: Tick,
        snapshot: Arc<EngineSnapshot>,
    },
    Shutdown,
}

/// A computed frame plus the snapshot id it came from.
#[derive(Debug)]
pub struct FrameResult {
    pub tick: Tick,
    pub snapshot_id: u64,
    pub frame: FrameState,
}

/// Fixed worker set over shared task/result channels.
pub struct FramePool {
    workers: Vec<JoinHandle<()>>,
    task_tx: Sender<Task>,
    result_rx: Receiver<FrameResult>,
}

impl FramePool {
    /// Spawns `workers` threads. The task queue is bounded at
    /// `2 × workers` — the backpressure threshold from the design: a
    /// full queue means the pool is saturated and far-future requests
    /// should simply be dropped.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (task_tx, task_rx) = bounded::<Task>(workers * 2);
        let (result_tx, result_rx) = bounded::<FrameResult>(workers * 4);

        let handles = (0..workers)
            .map(|index| {
                let task_rx = task_rx.clone();
                let result_tx = result_tx.clone();
                std::thread::Builder::new()
                    .name(format!("tickloom-frame-{index}"))
                    .spawn(move || worker_loop(&task_rx, &result_tx))
                    .expect("spawning a frame pool worker thread")
            })
            .collect();

        Self {
            workers: handles,
            task_tx,
            result_rx,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue depth right now.
    pub fn queue_len(&self) -> usize {
        self.task_tx.len()
    }

    /// Requests computation of `tick` from `snapshot`. Non-blocking;
    /// returns `false` when the queue is saturated (the request is
    /// dropped, not deferred — the orchestrator re-requests uncovered
    /// ticks every pulse anyway).
    pub fn request(&self, tick: Tick, snapshot: Arc<EngineSnapshot>) -> bool {
        match self.task_tx.try_send(Task::Compute { tick, snapshot }) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Collects every finished frame without blocking.
    pub fn drain_results(&self) -> Vec<FrameResult> {
        let mut results = Vec::new();
        while let Ok(result) = self.result_rx.try_recv() {
            results.push(result);
        }
        results
    }

    /// Sends one poison pill per worker and joins them all.
    pub fn shutdown(mut self) {
        for _ in 0..self.workers.len() {
            // `send` (not try_send): the pills must land even if the
            // queue is momentarily full of compute tasks.
            let _ = self.task_tx.send(Task::Shutdown);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        tracing::debug!("frame pool stopped");
    }
}

impl Drop for FramePool {
    fn drop(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.task_tx.try_send(Task::Shutdown);
        }
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for FramePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePool")
            .field("workers", &self.workers.len())
            .field("queued", &self.task_tx.len())
            .finish()
    }
}

fn worker_loop(task_rx: &Receiver<Task>, result_tx: &Sender<FrameResult>) {
    while let Ok(task) = task_rx.recv() {
        match task {
            Task::Compute { tick, snapshot } => {
                let frame = snapshot.compute_frame(tick);
                let result = FrameResult {
                    tick,
                    snapshot_id: snapshot.snapshot_id,
                    frame,
                };
                if result_tx.send(result).is_err() {
                    break; // orchestrator gone
                }
            }
            Task::Shutdown => break,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tickloom_anim::{
        AnimId, AnimKind, AnimationDef, AnimationEngine, PropertySet,
    };
    use tickloom_coord::CoordinationEngine;

    fn snapshot(id: u64) -> Arc<EngineSnapshot> {
        let mut anim = AnimationEngine::new();
        anim.register(
            AnimationDef::builder("a", AnimKind::Fade)
                .duration_ticks(100)
                .start_values(PropertySet::new().with_opacity(0.0))
                .end_values(PropertySet::new().with_opacity(1.0))
                .build()
                .unwrap(),
        )
        .unwrap();
        anim.start(&AnimId::new("a"), 0).unwrap();
        Arc::new(EngineSnapshot::new(
            id,
            0,
            anim,
            CoordinationEngine::new(),
            BTreeMap::new(),
            BTreeMap::new(),
            10_000_000,
        ))
    }

    #[test]
    fn test_pool_computes_requested_frames() {
        let pool = FramePool::new(2);
        let snap = snapshot(1);
        assert!(pool.request(10, snap.clone()));
        assert!(pool.request(20, snap.clone()));

        // Workers are asynchronous; poll until both results land.
        let mut results = Vec::new();
        for _ in 0..200 {
            results.extend(pool.drain_results());
            if results.len() == 2 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(results.len(), 2);
        results.sort_by_key(|r| r.tick);
        assert_eq!(results[0].tick, 10);
        assert_eq!(results[0].snapshot_id, 1);
        assert_eq!(
            results[0].frame.states[&AnimId::new("a")].opacity,
            Some(0.1)
        );
        pool.shutdown();
    }

    #[test]
    fn test_worker_output_matches_direct_computation() {
        let pool = FramePool::new(3);
        let snap = snapshot(1);
        for tick in 1..=30 {
            while !pool.request(tick, snap.clone()) {
                // Saturated queue: give the workers a moment.
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        }
        let mut results = Vec::new();
        for _ in 0..400 {
            results.extend(pool.drain_results());
            if results.len() == 30 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(results.len(), 30);
        for result in results {
            let direct = snap.compute_frame(result.tick);
            assert_eq!(result.frame, direct, "tick {}", result.tick);
            assert_eq!(
                result.frame.determinism_hash(),
                direct.determinism_hash()
            );
        }
        pool.shutdown();
    }

    #[test]
    fn test_saturated_queue_rejects_requests() {
        let pool = FramePool::new(1);
        let snap = snapshot(1);
        // Flood far past the queue bound; at least one must be refused.
        let mut refused = false;
        for tick in 1..1000 {
            if !pool.request(tick, snap.clone()) {
                refused = true;
                break;
            }
        }
        assert!(refused);
        pool.shutdown();
    }
}
