//! The ordered, bounded frame cache.
//!
//! Tick → pre-computed [`FrameState`], valid only under the current
//! snapshot id. Exactly one entry per tick; inserts carrying a stale
//! snapshot id are rejected (the caller counts them as
//! `snapshot_mismatch`); a snapshot bump purges everything at once.

use std::collections::BTreeMap;

use tickloom_anim::Tick;

use crate::snapshot::FrameState;

/// Outcome of an insert attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The result was computed from an outdated snapshot.
    StaleSnapshot,
    /// An entry for this tick already exists (kept; the frames are
    /// identical by the determinism contract).
    Duplicate,
    /// The tick is already in the past for the consumer.
    TooOld,
    /// The cache is full of nearer frames; this one was not worth an
    /// eviction.
    Overflow,
}

/// Bounded ordered map of pre-computed frames.
#[derive(Debug)]
pub struct FrameCache {
    entries: BTreeMap<Tick, FrameState>,
    capacity: usize,
    /// Only results tagged with this id are accepted.
    snapshot_id: u64,
    /// Ticks at or below this are never useful again.
    consumed_through: Tick,
}

impl FrameCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity: capacity.max(1),
            snapshot_id: 0,
            consumed_through: 0,
        }
    }

    pub fn snapshot_id(&self) -> u64 {
        self.snapshot_id
    }

    /// Purges everything and starts accepting only `snapshot_id`.
    pub fn invalidate(&mut self, snapshot_id: u64) {
        tracing::debug!(
            snapshot_id,
            purged = self.entries.len(),
            "frame cache invalidated"
        );
        self.entries.clear();
        self.snapshot_id = snapshot_id;
    }

    /// Tries to insert a worker result.
    ///
    /// When full, the farthest-future frame is evicted to make room —
    /// the consumer reads ticks in order, so near frames are worth
    /// more than far ones.
    pub fn insert(
        &mut self,
        tick: Tick,
        snapshot_id: u64,
        frame: FrameState,
    ) -> InsertOutcome {
        if snapshot_id != self.snapshot_id {
            return InsertOutcome::StaleSnapshot;
        }
        if tick <= self.consumed_through {
            return InsertOutcome::TooOld;
        }
        if self.entries.contains_key(&tick) {
            return InsertOutcome::Duplicate;
        }
        if self.entries.len() >= self.capacity {
            let farthest = *self
                .entries
                .keys()
                .next_back()
                .expect("non-empty cache at capacity");
            if farthest <= tick {
                // The new frame is even farther out; skip it.
                return InsertOutcome::Overflow;
            }
            self.entries.remove(&farthest);
        }
        self.entries.insert(tick, frame);
        InsertOutcome::Inserted
    }

    /// Removes and returns the frame for `tick`, if cached. Also drops
    /// every older entry — frames are consumed exactly once, in order.
    pub fn take(&mut self, tick: Tick) -> Option<FrameState> {
        self.consumed_through = self.consumed_through.max(tick);
        let frame = self.entries.remove(&tick);
        // Everything below the consumed tick is dead weight.
        self.entries = self.entries.split_off(&tick);
        frame
    }

    /// Whether a frame for `tick` is present.
    pub fn contains(&self, tick: Tick) -> bool {
        self.entries.contains_key(&tick)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn frame(tick: Tick) -> FrameState {
        FrameState {
            tick,
            states: BTreeMap::new(),
            marquee: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    #[test]
    fn test_insert_take_round_trip() {
        let mut cache = FrameCache::new(8);
        assert_eq!(cache.insert(5, 0, frame(5)), InsertOutcome::Inserted);
        assert!(cache.contains(5));
        let taken = cache.take(5).unwrap();
        assert_eq!(taken.tick, 5);
        // Consumed once.
        assert!(cache.take(5).is_none());
    }

    #[test]
    fn test_stale_snapshot_rejected() {
        let mut cache = FrameCache::new(8);
        cache.invalidate(3);
        assert_eq!(cache.insert(5, 2, frame(5)), InsertOutcome::StaleSnapshot);
        assert_eq!(cache.insert(5, 3, frame(5)), InsertOutcome::Inserted);
    }

    #[test]
    fn test_invalidate_purges_all_entries() {
        let mut cache = FrameCache::new(8);
        for t in 1..5 {
            cache.insert(t, 0, frame(t));
        }
        cache.invalidate(1);
        assert!(cache.is_empty());
        // Old-snapshot results arriving late are refused.
        assert_eq!(cache.insert(6, 0, frame(6)), InsertOutcome::StaleSnapshot);
    }

    #[test]
    fn test_one_entry_per_tick() {
        let mut cache = FrameCache::new(8);
        cache.insert(5, 0, frame(5));
        assert_eq!(cache.insert(5, 0, frame(5)), InsertOutcome::Duplicate);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_farthest_future() {
        let mut cache = FrameCache::new(3);
        for t in [10, 20, 30] {
            assert_eq!(cache.insert(t, 0, frame(t)), InsertOutcome::Inserted);
        }
        // Nearer frame displaces the farthest one.
        assert_eq!(cache.insert(15, 0, frame(15)), InsertOutcome::Inserted);
        assert!(cache.contains(10));
        assert!(cache.contains(15));
        assert!(cache.contains(20));
        assert!(!cache.contains(30));
        // A frame farther than everything cached is skipped when full.
        assert_eq!(cache.insert(99, 0, frame(99)), InsertOutcome::Overflow);
    }

    #[test]
    fn test_take_drops_older_entries() {
        let mut cache = FrameCache::new(8);
        for t in 1..6 {
            cache.insert(t, 0, frame(t));
        }
        cache.take(3);
        assert!(!cache.contains(1));
        assert!(!cache.contains(2));
        assert!(cache.contains(4));
        // Results for already-consumed ticks are refused.
        assert_eq!(cache.insert(2, 0, frame(2)), InsertOutcome::TooOld);
    }
}
