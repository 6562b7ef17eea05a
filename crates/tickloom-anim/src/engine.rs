//! The animation engine: immutable definitions in, pure `state_at` out.
//!
//! The engine is two maps: sealed definitions and per-animation runtime
//! (start tick, pause accounting, stop marker). `state_at(id, t)` reads
//! both and computes — it never writes, never reads a clock, and never
//! touches anything outside the engine. That is the purity invariant the
//! frame pre-computation pool depends on: a worker holding a cloned
//! engine must produce bit-identical states for any tick.
//!
//! Both maps are `BTreeMap`s. Fold order in `frame_state` and snapshot
//! byte order both follow the map's id ordering, which makes them
//! deterministic for free.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::def::{
    AnimId, AnimKind, AnimationDef, InterpolationMode, PreStartBehavior,
    PropertySet, Tick,
};
use crate::easing::{lerp_f, lerp_pos, lerp_rgb};
use crate::state::AnimationState;
use crate::AnimError;

/// A pure custom interpolator: `(eased_progress, start, end) → values`.
///
/// Plain `fn` pointers, not closures — a closure could capture mutable
/// state and silently break determinism across workers.
pub type CustomInterpFn = fn(f64, &PropertySet, &PropertySet) -> PropertySet;

// ---------------------------------------------------------------------------
// Runtime
// ---------------------------------------------------------------------------

/// Mutable per-animation lifecycle state.
///
/// Separate from [`AnimationDef`] so definitions stay immutable and
/// shareable. Everything here is tick-valued; pause is accounted as
/// "ticks spent paused", which keeps `state_at` a pure function of
/// `(runtime, t)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
struct AnimRuntime {
    /// Tick at which `start` was called. `None` = never started.
    start_tick: Option<Tick>,
    /// Tick at which `stop` was called, if any.
    stopped_at: Option<Tick>,
    /// Tick at which the current pause began, if paused now.
    paused_at: Option<Tick>,
    /// Total ticks spent in completed pause spans.
    paused_ticks: u64,
}

impl AnimRuntime {
    /// Pause ticks accrued by tick `t`, including an open pause span.
    fn paused_through(&self, t: Tick) -> u64 {
        match self.paused_at {
            Some(pa) if t >= pa => self.paused_ticks + (t - pa),
            _ => self.paused_ticks,
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Stores animation definitions and computes per-tick states.
///
/// Cloning the engine clones both maps; a clone is a consistent snapshot
/// that workers can evaluate independently.
#[derive(Clone, Default)]
pub struct AnimationEngine {
    defs: BTreeMap<AnimId, AnimationDef>,
    runtime: BTreeMap<AnimId, AnimRuntime>,
    /// Custom interpolators by name. Not serialized — snapshots carry
    /// interpolator names and `restore` re-checks them against this map.
    interpolators: BTreeMap<String, CustomInterpFn>,
}

impl AnimationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pure custom interpolator under a name.
    ///
    /// Must happen before any definition that references the name.
    pub fn register_interpolator(
        &mut self,
        name: impl Into<String>,
        f: CustomInterpFn,
    ) {
        self.interpolators.insert(name.into(), f);
    }

    /// Registers a sealed definition. Rejects duplicate ids.
    ///
    /// # Errors
    /// [`AnimError::DuplicateId`] if the id is taken;
    /// [`AnimError::UnknownInterpolator`] if the definition uses a custom
    /// interpolation mode whose name was never registered.
    pub fn register(&mut self, def: AnimationDef) -> Result<AnimId, AnimError> {
        let id = def.id().clone();
        if self.defs.contains_key(&id) {
            return Err(AnimError::DuplicateId(id));
        }
        if let InterpolationMode::Custom { interpolator } = def.interpolation()
        {
            if !self.interpolators.contains_key(interpolator) {
                return Err(AnimError::UnknownInterpolator {
                    id,
                    name: interpolator.clone(),
                });
            }
        }
        tracing::debug!(animation = %id, kind = %def.kind(), "animation registered");
        self.defs.insert(id.clone(), def);
        self.runtime.insert(id.clone(), AnimRuntime::default());
        Ok(id)
    }

    /// Removes a definition and its runtime state.
    pub fn unregister(&mut self, id: &AnimId) -> Result<(), AnimError> {
        self.defs
            .remove(id)
            .ok_or_else(|| AnimError::NotFound(id.clone()))?;
        self.runtime.remove(id);
        tracing::debug!(animation = %id, "animation unregistered");
        Ok(())
    }

    /// Marks an animation started at `start_tick`.
    ///
    /// Idempotent: starting an already-running animation keeps its
    /// original start tick. Starting a stopped animation restarts it
    /// from scratch.
    pub fn start(&mut self, id: &AnimId, start_tick: Tick) -> Result<(), AnimError> {
        let rt = self.runtime_mut(id)?;
        if rt.start_tick.is_some() && rt.stopped_at.is_none() {
            return Ok(());
        }
        *rt = AnimRuntime {
            start_tick: Some(start_tick),
            ..AnimRuntime::default()
        };
        tracing::debug!(animation = %id, start_tick, "animation started");
        Ok(())
    }

    /// Stops an animation at `tick`. `state_at` returns `None` from
    /// `tick` onwards. Idempotent.
    pub fn stop(&mut self, id: &AnimId, tick: Tick) -> Result<(), AnimError> {
        let rt = self.runtime_mut(id)?;
        if rt.stopped_at.is_none() {
            rt.stopped_at = Some(tick);
            tracing::debug!(animation = %id, tick, "animation stopped");
        }
        Ok(())
    }

    /// Freezes progress at `tick`. Idempotent.
    pub fn pause(&mut self, id: &AnimId, tick: Tick) -> Result<(), AnimError> {
        let rt = self.runtime_mut(id)?;
        if rt.paused_at.is_none() {
            rt.paused_at = Some(tick);
        }
        Ok(())
    }

    /// Resumes at `tick`; the paused span is excluded from elapsed time.
    /// Idempotent.
    pub fn resume(&mut self, id: &AnimId, tick: Tick) -> Result<(), AnimError> {
        let rt = self.runtime_mut(id)?;
        if let Some(pa) = rt.paused_at.take() {
            rt.paused_ticks += tick.saturating_sub(pa);
        }
        Ok(())
    }

    fn runtime_mut(&mut self, id: &AnimId) -> Result<&mut AnimRuntime, AnimError> {
        self.runtime
            .get_mut(id)
            .ok_or_else(|| AnimError::NotFound(id.clone()))
    }

    /// Whether an id is registered.
    pub fn contains(&self, id: &AnimId) -> bool {
        self.defs.contains_key(id)
    }

    /// The registered definition, if any.
    pub fn def(&self, id: &AnimId) -> Option<&AnimationDef> {
        self.defs.get(id)
    }

    /// Ids of all registered animations, in order.
    pub fn ids(&self) -> impl Iterator<Item = &AnimId> {
        self.defs.keys()
    }

    // -----------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------

    /// Computes the animation's state at tick `t`.
    ///
    /// Pure: depends only on the definition, the runtime entry, and `t`.
    /// Returns `None` when the animation is not registered, never
    /// started, stopped at or before `t`, or pre-start with the default
    /// `Hidden` behavior. Completed states are sticky — they keep being
    /// returned so barriers can observe `completed == true`.
    pub fn state_at(&self, id: &AnimId, t: Tick) -> Option<AnimationState> {
        let def = self.defs.get(id)?;
        let rt = self.runtime.get(id)?;
        let start = rt.start_tick?;
        if let Some(stop) = rt.stopped_at {
            if t >= stop {
                return None;
            }
        }

        let origin = start + def.delay_ticks();
        if t < origin {
            return match def.pre_start() {
                PreStartBehavior::Hidden => None,
                PreStartBehavior::HoldStartValues => Some(self.make_state(
                    def, t, 0.0, false, false,
                )),
            };
        }

        let elapsed = (t - origin).saturating_sub(rt.paused_through(t));
        let duration = def.duration_ticks();

        // Finite repetition: completion is sticky.
        if let Some(total) = def.total_ticks() {
            if elapsed >= total {
                let last_cycle = Tick::from(def.repeat_count() - 1);
                let final_phase =
                    if def.reverse_on_repeat() && last_cycle % 2 == 1 {
                        0.0
                    } else {
                        1.0
                    };
                let p = def.easing().apply(final_phase);
                return Some(self.make_state(def, t, p, false, true));
            }
        }

        let cycle = elapsed / duration;
        // A one-tick animation is at its end the moment it is visible.
        let mut phase = if duration == 1 {
            1.0
        } else {
            (elapsed % duration) as f64 / duration as f64
        };
        if def.reverse_on_repeat() && cycle % 2 == 1 {
            phase = 1.0 - phase;
        }
        let p = def.easing().apply(phase);
        Some(self.make_state(def, t, p, true, false))
    }

    /// Folds `state_at` over every registered animation, in id order.
    pub fn frame_state(&self, t: Tick) -> BTreeMap<AnimId, AnimationState> {
        let mut states = BTreeMap::new();
        for id in self.defs.keys() {
            if let Some(state) = self.state_at(id, t) {
                states.insert(id.clone(), state);
            }
        }
        states
    }

    /// Whether the animation is actively animating at `t`.
    pub fn is_active_at(&self, id: &AnimId, t: Tick) -> bool {
        self.state_at(id, t).is_some_and(|s| s.active)
    }

    /// Whether the animation has completed at or before `t`.
    pub fn is_completed_at(&self, id: &AnimId, t: Tick) -> bool {
        self.state_at(id, t).is_some_and(|s| s.completed)
    }

    /// Eased progress at `t`, if the animation has a state there.
    pub fn progress_at(&self, id: &AnimId, t: Tick) -> Option<f64> {
        self.state_at(id, t).map(|s| s.progress)
    }

    /// The first tick at which the animation is complete, `None` for
    /// infinite repeats, unstarted, or stopped animations. Pause spans
    /// that already closed push the end tick out.
    pub fn end_tick(&self, id: &AnimId) -> Option<Tick> {
        let def = self.defs.get(id)?;
        let rt = self.runtime.get(id)?;
        let start = rt.start_tick?;
        if rt.stopped_at.is_some() {
            return None;
        }
        let total = def.total_ticks()?;
        Some(start + def.delay_ticks() + total + rt.paused_ticks)
    }

    fn make_state(
        &self,
        def: &AnimationDef,
        t: Tick,
        p: f64,
        active: bool,
        completed: bool,
    ) -> AnimationState {
        let values = self.interpolate(def, p);
        AnimationState {
            animation_id: def.id().clone(),
            tick: t,
            progress: p,
            active,
            completed,
            position: values.position,
            opacity: values.opacity,
            scale: values.scale,
            rotation: values.rotation,
            color: values.color,
            visible_chars: values.visible_chars,
            custom: values.custom,
        }
    }

    /// Interpolates every animated property independently at eased
    /// progress `p`. Reductions run in fixed (struct field, then
    /// BTreeMap key) order.
    fn interpolate(&self, def: &AnimationDef, p: f64) -> PropertySet {
        let sv = def.start_values();
        let ev = def.end_values();

        let p = match def.interpolation() {
            InterpolationMode::Smooth => p,
            InterpolationMode::Stepped => {
                let n = def.duration_ticks() as f64;
                (p * n).floor() / n
            }
            InterpolationMode::Custom { interpolator } => {
                // Registration checked the name, so the lookup can only
                // miss after a restore into an engine missing the
                // registration — treated as identity at p.
                if let Some(f) = self.interpolators.get(interpolator) {
                    return f(p, sv, ev);
                }
                p
            }
        };

        let mut out = PropertySet::default();
        if let (Some(a), Some(b)) = (sv.position, ev.position) {
            out.position = Some(lerp_pos(a, b, p));
        }
        if let (Some(a), Some(b)) = (sv.opacity, ev.opacity) {
            out.opacity = Some(lerp_f(a, b, p));
        }
        if let (Some(a), Some(b)) = (sv.scale, ev.scale) {
            out.scale = Some(lerp_f(a, b, p));
        }
        if let (Some(a), Some(b)) = (sv.rotation, ev.rotation) {
            out.rotation = Some(lerp_f(a, b, p));
        }
        if let (Some(a), Some(b)) = (sv.color, ev.color) {
            out.color = Some(lerp_rgb(a, b, p));
        }
        if let (Some(a), Some(b)) = (sv.progress, ev.progress) {
            out.progress = Some(lerp_f(a, b, p));
        }
        if let (Some(a), Some(b)) = (sv.visible_chars, ev.visible_chars) {
            out.visible_chars =
                Some(lerp_f(f64::from(a), f64::from(b), p).floor() as u32);
        }
        for (key, a) in &sv.custom {
            if let Some(b) = ev.custom.get(key) {
                out.custom.insert(key.clone(), lerp_f(*a, *b, p));
            }
        }
        out
    }

    // -----------------------------------------------------------------
    // Snapshot / restore
    // -----------------------------------------------------------------

    /// Serializes definitions and runtime state deterministically.
    ///
    /// Fixed struct field order, `BTreeMap` key order, no floating-point
    /// free text — the same engine state always produces the same bytes.
    pub fn snapshot(&self) -> Result<Vec<u8>, AnimError> {
        let doc = EngineDoc {
            defs: &self.defs,
            runtime: &self.runtime,
        };
        serde_json::to_vec(&doc).map_err(AnimError::SnapshotEncode)
    }

    /// Replaces engine state from snapshot bytes.
    ///
    /// Custom interpolator registrations are kept — the snapshot carries
    /// names, and any definition naming an unregistered interpolator is
    /// rejected before the engine is touched.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<(), AnimError> {
        let doc: EngineDocOwned =
            serde_json::from_slice(bytes).map_err(AnimError::SnapshotDecode)?;
        for def in doc.defs.values() {
            if let InterpolationMode::Custom { interpolator } =
                def.interpolation()
            {
                if !self.interpolators.contains_key(interpolator) {
                    return Err(AnimError::UnknownInterpolator {
                        id: def.id().clone(),
                        name: interpolator.clone(),
                    });
                }
            }
        }
        self.defs = doc.defs;
        self.runtime = doc.runtime;
        Ok(())
    }
}

/// Borrowing view for snapshot encoding.
#[derive(Serialize)]
struct EngineDoc<'a> {
    defs: &'a BTreeMap<AnimId, AnimationDef>,
    runtime: &'a BTreeMap<AnimId, AnimRuntime>,
}

/// Owned counterpart for decoding.
#[derive(Deserialize)]
struct EngineDocOwned {
    defs: BTreeMap<AnimId, AnimationDef>,
    runtime: BTreeMap<AnimId, AnimRuntime>,
}

impl std::fmt::Debug for AnimationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnimationEngine")
            .field("animations", &self.defs.len())
            .field("interpolators", &self.interpolators.len())
            .finish()
    }
}

// =========================================================================
// Tests
// =========================================================================
