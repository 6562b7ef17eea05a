//! Engine metrics: cheap atomic counters for everything the render
//! path degrades instead of failing.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter registry. One instance per engine, shared by reference.
///
/// Every counter matches an error kind from the taxonomy that is
/// handled locally on the render path — incrementing is the "error
/// handling".
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Ring-buffer overflow dropped an unread sample.
    pub sample_dropped: AtomicU64,
    /// Synchronous frame computation overran the frame budget.
    pub frame_missed: AtomicU64,
    /// An expression degraded to a typed zero on the render path.
    pub expr_eval_error: AtomicU64,
    /// A worker result arrived with a stale snapshot id.
    pub snapshot_mismatch: AtomicU64,
    /// The persistence queue was full when a write was due.
    pub persistence_lagging: AtomicU64,
    /// Marquee fixed-point resolution exhausted its budget.
    pub marquee_not_converged: AtomicU64,
    /// Frames served from the pre-compute cache.
    pub cache_hits: AtomicU64,
    /// Frames computed synchronously on the orchestrator thread.
    pub cache_misses: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A point-in-time copy of every counter, keyed by metric name.
    /// Names match the `performance_metrics.kind` column.
    pub fn snapshot(&self) -> BTreeMap<&'static str, u64> {
        let mut out = BTreeMap::new();
        out.insert("sample_dropped", self.sample_dropped.load(Ordering::Relaxed));
        out.insert("frame_missed", self.frame_missed.load(Ordering::Relaxed));
        out.insert(
            "expr_eval_error",
            self.expr_eval_error.load(Ordering::Relaxed),
        );
        out.insert(
            "snapshot_mismatch",
            self.snapshot_mismatch.load(Ordering::Relaxed),
        );
        out.insert(
            "persistence_lagging",
            self.persistence_lagging.load(Ordering::Relaxed),
        );
        out.insert(
            "marquee_not_converged",
            self.marquee_not_converged.load(Ordering::Relaxed),
        );
        out.insert("cache_hits", self.cache_hits.load(Ordering::Relaxed));
        out.insert("cache_misses", self.cache_misses.load(Ordering::Relaxed));
        out
    }
}

/// Bumps a counter by one.
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = MetricsRegistry::new();
        bump(&metrics.frame_missed);
        bump(&metrics.frame_missed);
        bump(&metrics.sample_dropped);
        let snap = metrics.snapshot();
        assert_eq!(snap["frame_missed"], 2);
        assert_eq!(snap["sample_dropped"], 1);
        assert_eq!(snap["cache_hits"], 0);
    }
}
