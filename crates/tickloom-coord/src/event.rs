//! Coordination events and their total order.
//!
//! Events are append-only facts: "this primitive did this at this
//! tick". Their ordering is part of the determinism contract — two runs
//! must not only emit the same events but emit them in the same order,
//! because downstream side effects (animation starts) are applied in
//! event order.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use tickloom_anim::Tick;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A unique identifier for a coordination primitive.
///
/// Lexicographic order of the inner string is the final tiebreak in the
/// event total order, so ids are part of the observable behavior.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PrimitiveId(pub String);

impl PrimitiveId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrimitiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PrimitiveId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// What happened. The variant order below is also the rank order used
/// inside a tick.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    SyncTriggered,
    SequenceStepStarted,
    TriggerActivated,
    BarrierResolved,
    TriggerReset,
    SequenceCompleted,
}

impl EventKind {
    /// Rank within a tick:
    /// `SYNC_TRIGGERED < SEQUENCE_STEP_STARTED < TRIGGER_ACTIVATED <
    /// BARRIER_RESOLVED < TRIGGER_RESET < SEQUENCE_COMPLETED`.
    pub fn rank(&self) -> u8 {
        match self {
            Self::SyncTriggered => 0,
            Self::SequenceStepStarted => 1,
            Self::TriggerActivated => 2,
            Self::BarrierResolved => 3,
            Self::TriggerReset => 4,
            Self::SequenceCompleted => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyncTriggered => "SYNC_TRIGGERED",
            Self::SequenceStepStarted => "SEQUENCE_STEP_STARTED",
            Self::TriggerActivated => "TRIGGER_ACTIVATED",
            Self::BarrierResolved => "BARRIER_RESOLVED",
            Self::TriggerReset => "TRIGGER_RESET",
            Self::SequenceCompleted => "SEQUENCE_COMPLETED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// An immutable, append-only coordination event.
///
/// The payload is small structured data (which animation started, was
/// the barrier timed out, …). `serde_json::Value` maps are backed by a
/// `BTreeMap`, so payload serialization is deterministic too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationEvent {
    pub tick: Tick,
    pub kind: EventKind,
    pub primitive_id: PrimitiveId,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub payload: serde_json::Value,
}

impl CoordinationEvent {
    pub fn new(tick: Tick, kind: EventKind, primitive_id: PrimitiveId) -> Self {
        Self {
            tick,
            kind,
            primitive_id,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// The `(tick, kind_rank, primitive_id)` sort key.
    pub fn order_key(&self) -> (Tick, u8, &str) {
        (self.tick, self.kind.rank(), self.primitive_id.as_str())
    }
}

impl Eq for CoordinationEvent {}

impl Ord for CoordinationEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

impl PartialOrd for CoordinationEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_rank_order_matches_contract() {
        let ordered = [
            EventKind::SyncTriggered,
            EventKind::SequenceStepStarted,
            EventKind::TriggerActivated,
            EventKind::BarrierResolved,
            EventKind::TriggerReset,
            EventKind::SequenceCompleted,
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0].rank() < pair[1].rank());
        }
    }

    #[test]
    fn test_event_order_tick_then_rank_then_id() {
        let early = CoordinationEvent::new(
            1,
            EventKind::SequenceCompleted,
            PrimitiveId::new("z"),
        );
        let late_low_rank = CoordinationEvent::new(
            2,
            EventKind::SyncTriggered,
            PrimitiveId::new("a"),
        );
        // Tick dominates rank.
        assert!(early < late_low_rank);

        let sync_a =
            CoordinationEvent::new(5, EventKind::SyncTriggered, "a".into());
        let sync_b =
            CoordinationEvent::new(5, EventKind::SyncTriggered, "b".into());
        let barrier_a =
            CoordinationEvent::new(5, EventKind::BarrierResolved, "a".into());
        // Rank dominates id; id breaks rank ties lexicographically.
        assert!(sync_a < barrier_a);
        assert!(sync_a < sync_b);
        assert!(sync_b < barrier_a);
    }

    #[test]
    fn test_kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&EventKind::BarrierResolved).unwrap();
        assert_eq!(json, "\"BARRIER_RESOLVED\"");
    }

    #[test]
    fn test_null_payload_is_omitted() {
        let event =
            CoordinationEvent::new(3, EventKind::SyncTriggered, "s".into());
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("payload"));

        let with = event.with_payload(serde_json::json!({ "timeout": true }));
        let json = serde_json::to_string(&with).unwrap();
        assert!(json.contains("timeout"));
    }
}
