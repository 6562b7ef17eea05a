//! Frame states and engine snapshots.
//!
//! A [`FrameState`] is everything a renderer needs for one tick. An
//! [`EngineSnapshot`] is an immutable capture of the engine — cloned
//! animation and coordination state, frozen data variables, resolved
//! marquee timelines — tagged with a monotonically increasing
//! `snapshot_id`. Workers hold a snapshot and compute future frames
//! from it; because every piece is deterministic, a worker's frame is
//! bit-identical to the one the orchestrator would compute live.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use tickloom_anim::{AnimId, AnimationEngine, AnimationState, Tick};
use tickloom_coord::{
    CoordinationEngine, CoordinationEvent, SideEffect,
};
use tickloom_expr::{CompiledExpr, Evaluator, Value};
use tickloom_marquee::{PositionTimeline, WidgetId};

/// Everything the renderer consumes for one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameState {
    pub tick: Tick,
    /// Animation states, in id order.
    pub states: BTreeMap<AnimId, AnimationState>,
    /// Marquee widget positions, in widget order.
    pub marquee: BTreeMap<WidgetId, (i32, i32)>,
    /// Coordination events emitted during this tick, in emission order.
    pub events: Vec<CoordinationEvent>,
}

impl FrameState {
    /// Structural hash excluding execution-specific fields (the tick
    /// counter and each state's tick).
    ///
    /// Two frames at the same logical phase hash identically across
    /// runs, threads, and worker processes of the same build — this is
    /// the cross-run determinism check and the cache-equivalence test
    /// in one number.
    pub fn determinism_hash(&self) -> u64 {
        // DefaultHasher::new() uses fixed keys, so the hash is stable
        // for a given build.
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        for (id, state) in &self.states {
            id.as_str().hash(&mut hasher);
            state.canonical_bytes().hash(&mut hasher);
        }
        for (widget, pos) in &self.marquee {
            widget.as_str().hash(&mut hasher);
            pos.hash(&mut hasher);
        }
        for event in &self.events {
            event.kind.rank().hash(&mut hasher);
            event.primitive_id.as_str().hash(&mut hasher);
            event.payload.to_string().hash(&mut hasher);
        }
        hasher.finish()
    }

    /// Structural equality excluding per-state ticks; see
    /// [`AnimationState::same_values`].
    pub fn same_values(&self, other: &Self) -> bool {
        self.states.len() == other.states.len()
            && self
                .states
                .iter()
                .zip(other.states.iter())
                .all(|((ida, a), (idb, b))| ida == idb && a.same_values(b))
            && self.marquee == other.marquee
            && self.events.len() == other.events.len()
            && self
                .events
                .iter()
                .zip(other.events.iter())
                .all(|(a, b)| {
                    a.kind == b.kind
                        && a.primitive_id == b.primitive_id
                        && a.payload == b.payload
                })
    }
}

/// An immutable engine capture handed to pre-compute workers.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    /// Monotonic id; results tagged with an older id are discarded.
    pub snapshot_id: u64,
    /// The tick whose frame was last emitted when the capture was
    /// taken. Workers simulate forward from `base_tick + 1`.
    pub base_tick: Tick,
    anim: AnimationEngine,
    coord: CoordinationEngine,
    /// Data variables frozen at capture time; data triggers evaluate
    /// against these during pre-computation.
    vars: BTreeMap<String, Value>,
    timelines: BTreeMap<WidgetId, PositionTimeline>,
    expression_time_budget_ns: u64,
}

impl EngineSnapshot {
    pub fn new(
        snapshot_id: u64,
        base_tick: Tick,
        anim: AnimationEngine,
        coord: CoordinationEngine,
        vars: BTreeMap<String, Value>,
        timelines: BTreeMap<WidgetId, PositionTimeline>,
        expression_time_budget_ns: u64,
    ) -> Self {
        Self {
            snapshot_id,
            base_tick,
            anim,
            coord,
            vars,
            timelines,
            expression_time_budget_ns,
        }
    }

    /// Computes the frame for `tick` (which must be `> base_tick`)
    /// purely from the capture.
    ///
    /// The coordination engine is simulated tick by tick from the base
    /// so releases and trigger actions land exactly where the live
    /// engine would put them. With data variables frozen, the whole
    /// computation is a pure function of `(snapshot, tick)`.
    pub fn compute_frame(&self, tick: Tick) -> FrameState {
        let mut anim = self.anim.clone();
        let mut coord = self.coord.clone();
        let evaluator = Evaluator::new(self.expression_time_budget_ns);
        let vars = &self.vars;
        let eval_cond = move |expr: &CompiledExpr| {
            let bindings: Vec<Value> = expr
                .variables()
                .iter()
                .map(|name| vars.get(name).cloned().unwrap_or(Value::Number(0.0)))
                .collect();
            evaluator.eval_bool_or_false(expr, &bindings)
        };

        let mut events = Vec::new();
        for t in (self.base_tick + 1)..=tick {
            let outcome = coord.evaluate_at(t, &anim, &eval_cond);
            for effect in &outcome.effects {
                match effect {
                    SideEffect::StartAnimation { animation, at_tick } => {
                        let _ = anim.start(animation, *at_tick);
                    }
                    SideEffect::StopAnimation { animation, at_tick } => {
                        let _ = anim.stop(animation, *at_tick);
                    }
                }
            }
            if t == tick {
                events = outcome.events;
            }
        }

        let marquee = self
            .timelines
            .iter()
            .map(|(widget, timeline)| {
                (widget.clone(), timeline.position_at(tick))
            })
            .collect();

        FrameState {
            tick,
            states: anim.frame_state(tick),
            marquee,
            events,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickloom_anim::{AnimKind, AnimationDef, PropertySet};
    use tickloom_coord::{EventKind, PrimitiveId, PrimitiveSpec};

    fn snapshot_with_fade() -> EngineSnapshot {
        let mut anim = AnimationEngine::new();
        anim.register(
            AnimationDef::builder("a", AnimKind::Fade)
                .duration_ticks(60)
                .start_values(PropertySet::new().with_opacity(0.0))
                .end_values(PropertySet::new().with_opacity(1.0))
                .build()
                .unwrap(),
        )
        .unwrap();
        anim.start(&AnimId::new("a"), 0).unwrap();

        let mut coord = CoordinationEngine::new();
        coord
            .register(
                PrimitiveId::new("mid"),
                PrimitiveSpec::Sync {
                    sync_tick: 30,
                    animation_ids: vec![AnimId::new("a")],
                },
            )
            .unwrap();

        EngineSnapshot::new(
            7,
            0,
            anim,
            coord,
            BTreeMap::new(),
            BTreeMap::new(),
            10_000_000,
        )
    }

    #[test]
    fn test_compute_frame_is_reproducible() {
        let snapshot = snapshot_with_fade();
        let a = snapshot.compute_frame(45);
        let b = snapshot.compute_frame(45);
        assert_eq!(a, b);
        assert_eq!(a.determinism_hash(), b.determinism_hash());
    }

    #[test]
    fn test_compute_frame_carries_tick_events() {
        let snapshot = snapshot_with_fade();
        let frame = snapshot.compute_frame(30);
        assert_eq!(frame.events.len(), 1);
        assert_eq!(frame.events[0].kind, EventKind::SyncTriggered);
        // Neighboring frames carry no stale events.
        assert!(snapshot.compute_frame(31).events.is_empty());
    }

    #[test]
    fn test_determinism_hash_ignores_tick_field() {
        let snapshot = snapshot_with_fade();
        let mut frame_a = snapshot.compute_frame(10);
        let frame_b = snapshot.compute_frame(10);
        frame_a.tick = 9999;
        assert_eq!(
            frame_a.determinism_hash(),
            frame_b.determinism_hash()
        );
    }

    #[test]
    fn test_hash_differs_for_different_phases() {
        let snapshot = snapshot_with_fade();
        assert_ne!(
            snapshot.compute_frame(10).determinism_hash(),
            snapshot.compute_frame(11).determinism_hash(),
        );
    }
}
