//! The coordination engine: primitive state machines over the
//! animation oracle.
//!
//! `evaluate_at(t)` walks every registered primitive in id order, steps
//! its state machine against the animation engine and the data
//! conditions, and returns the tick's events plus the side effects the
//! orchestrator must apply. Direct events are sorted by
//! `(kind_rank, primitive_id)`; events *caused* by another event in the
//! same tick (a barrier releasing its dependents, a trigger activating
//! a sequence) follow their cause — a barrier resolution is printed
//! before the sync it released.
//!
//! `predict` runs the same machinery against clones, so warming the
//! frame cache can look into the future without disturbing live state.

use std::collections::BTreeMap;

use serde_json::json;

use tickloom_anim::{AnimationEngine, Tick};
use tickloom_expr::CompiledExpr;

use crate::event::{CoordinationEvent, EventKind, PrimitiveId};
use crate::primitive::{
    BarrierTimeoutPolicy, Primitive, PrimitiveSpec, PrimitiveState,
    SideEffect, TriggerAction,
};
use crate::CoordError;

/// Evaluates a compiled trigger condition against current data.
/// Render-path semantics: failures inside must yield `false`.
pub type ConditionEval<'a> = &'a dyn Fn(&CompiledExpr) -> bool;

/// Everything one tick of coordination produced.
#[derive(Debug, Clone, Default)]
pub struct TickOutcome {
    /// Events in emission order (sorted direct events, then cascades).
    pub events: Vec<CoordinationEvent>,
    /// Lifecycle effects for the orchestrator to apply, in event order.
    pub effects: Vec<SideEffect>,
}

/// Output of stepping one primitive.
#[derive(Debug, Default)]
struct StepResult {
    events: Vec<CoordinationEvent>,
    effects: Vec<SideEffect>,
    /// Cascade events that must follow this primitive's own events.
    cascade_events: Vec<CoordinationEvent>,
    /// Primitives to re-anchor at the current tick.
    activations: Vec<PrimitiveId>,
}

/// Stores primitives and steps their state machines.
#[derive(Debug, Clone, Default)]
pub struct CoordinationEngine {
    primitives: BTreeMap<PrimitiveId, Primitive>,
}

impl CoordinationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a primitive. Rejects duplicates and invalid specs.
    ///
    /// # Errors
    /// [`CoordError::DuplicateId`] or [`CoordError::InvalidPrimitive`].
    pub fn register(
        &mut self,
        id: PrimitiveId,
        spec: PrimitiveSpec,
    ) -> Result<(), CoordError> {
        if self.primitives.contains_key(&id) {
            return Err(CoordError::DuplicateId(id));
        }
        spec.validate(&id)?;
        tracing::debug!(primitive = %id, "primitive registered");
        self.primitives.insert(id.clone(), Primitive::new(id, spec));
        Ok(())
    }

    /// Removes a primitive.
    pub fn remove(&mut self, id: &PrimitiveId) -> Result<(), CoordError> {
        self.primitives
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CoordError::NotFound(id.clone()))
    }

    /// Current state of a primitive.
    pub fn state(&self, id: &PrimitiveId) -> Option<&PrimitiveState> {
        self.primitives.get(id).map(|p| &p.state)
    }

    pub fn contains(&self, id: &PrimitiveId) -> bool {
        self.primitives.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &PrimitiveId> {
        self.primitives.keys()
    }

    /// Re-anchors a primitive at `tick` and resets it to its initial
    /// state. Sequences anchored this way start their steps at `tick`.
    ///
    /// # Errors
    /// [`CoordError::NotFound`] for unknown ids.
    pub fn activate(
        &mut self,
        id: &PrimitiveId,
        tick: Tick,
    ) -> Result<(), CoordError> {
        let primitive = self
            .primitives
            .get_mut(id)
            .ok_or_else(|| CoordError::NotFound(id.clone()))?;
        primitive.state = match &primitive.spec {
            PrimitiveSpec::Sequence { .. } => PrimitiveState::Running {
                next_step: 0,
                anchor_tick: tick,
            },
            other => other.initial_state(),
        };
        Ok(())
    }

    /// Per-primitive states, for checkpointing.
    pub fn states_snapshot(&self) -> BTreeMap<PrimitiveId, PrimitiveState> {
        self.primitives
            .iter()
            .map(|(id, p)| (id.clone(), p.state.clone()))
            .collect()
    }

    /// Restores previously snapshotted states. Ids missing on either
    /// side are left as they are — specs must be re-registered by the
    /// application before restore.
    pub fn restore_states(
        &mut self,
        states: BTreeMap<PrimitiveId, PrimitiveState>,
    ) {
        for (id, state) in states {
            if let Some(primitive) = self.primitives.get_mut(&id) {
                primitive.state = state;
            }
        }
    }

    // -----------------------------------------------------------------
    // Evaluation
    // -----------------------------------------------------------------

    /// Steps every primitive at tick `t`.
    ///
    /// Mutates primitive states. The returned events are in emission
    /// order; effects are aligned with their events.
    pub fn evaluate_at(
        &mut self,
        t: Tick,
        anim: &AnimationEngine,
        eval_cond: ConditionEval<'_>,
    ) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        let ids: Vec<PrimitiveId> = self.primitives.keys().cloned().collect();

        // Phase 1: step every primitive, gather direct events.
        let mut direct: Vec<CoordinationEvent> = Vec::new();
        let mut cascades: Vec<CoordinationEvent> = Vec::new();
        let mut activations: Vec<PrimitiveId> = Vec::new();
        for id in &ids {
            let result = self.step_primitive(id, t, anim, eval_cond);
            direct.extend(result.events);
            cascades.extend(result.cascade_events);
            outcome.effects.extend(result.effects);
            activations.extend(result.activations);
        }
        direct.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        outcome.events.extend(direct);
        outcome.events.extend(cascades);

        // Phase 2: cascade activations. Each primitive activates at
        // most once per tick, so this terminates.
        let mut already: Vec<PrimitiveId> = Vec::new();
        while !activations.is_empty() {
            let mut next_round: Vec<PrimitiveId> = Vec::new();
            for id in activations {
                if already.contains(&id) || !self.primitives.contains_key(&id) {
                    continue;
                }
                already.push(id.clone());
                // Errors are impossible here: existence checked above.
                let _ = self.activate(&id, t);
                let result = self.step_primitive(&id, t, anim, eval_cond);
                outcome.events.extend(result.events);
                outcome.events.extend(result.cascade_events);
                outcome.effects.extend(result.effects);
                next_round.extend(result.activations);
            }
            activations = next_round;
        }

        outcome
    }

    /// Simulates coordination over `[t0, t1]` without touching live
    /// state. Side effects are applied to a cloned animation engine so
    /// downstream ticks see upstream releases.
    pub fn predict(
        &self,
        t0: Tick,
        t1: Tick,
        anim: &AnimationEngine,
        eval_cond: ConditionEval<'_>,
    ) -> Vec<CoordinationEvent> {
        let mut engine = self.clone();
        let mut anim = anim.clone();
        let mut events = Vec::new();
        for t in t0..=t1 {
            let outcome = engine.evaluate_at(t, &anim, eval_cond);
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
            events.extend(outcome.events);
        }
        events
    }

    // -----------------------------------------------------------------
    // Per-primitive stepping
    // -----------------------------------------------------------------

    fn step_primitive(
        &mut self,
        id: &PrimitiveId,
        t: Tick,
        anim: &AnimationEngine,
        eval_cond: ConditionEval<'_>,
    ) -> StepResult {
        let Some(primitive) = self.primitives.get(id) else {
            return StepResult::default();
        };
        let spec = primitive.spec.clone();
        let state = primitive.state.clone();

        let (result, new_state) = match (&spec, state) {
            (
                PrimitiveSpec::Sync {
                    sync_tick,
                    animation_ids,
                },
                PrimitiveState::Pending,
            ) => step_sync(id, t, *sync_tick, animation_ids),
            (
                PrimitiveSpec::Barrier {
                    barrier_tick,
                    waiting_ids,
                    dependents,
                    timeout_ticks,
                    on_timeout,
                },
                PrimitiveState::Waiting,
            ) => step_barrier(
                id,
                t,
                anim,
                *barrier_tick,
                waiting_ids,
                dependents,
                *timeout_ticks,
                *on_timeout,
            ),
            (PrimitiveSpec::Sequence { start_tick, steps }, state) => {
                step_sequence(id, t, anim, *start_tick, steps, state)
            }

            (
                PrimitiveSpec::ProgressTrigger {
                    animation_id,
                    threshold,
                    auto_reset,
                    action,
                },
                state @ (PrimitiveState::Armed { .. }
                | PrimitiveState::Triggered),
            ) => {
                let above = anim
                    .progress_at(animation_id, t)
                    .is_some_and(|p| p >= *threshold);
                step_trigger(
                    id,
                    t,
                    above,
                    *auto_reset,
                    action,
                    state,
                    json!({ "animation": animation_id, "threshold": threshold }),
                )
            }
            (
                PrimitiveSpec::DataTrigger {
                    condition_src,
                    condition,
                    auto_reset,
                    action,
                },
                state @ (PrimitiveState::Armed { .. }
                | PrimitiveState::Triggered),
            ) => {
                let above = eval_cond(condition);
                step_trigger(
                    id,
                    t,
                    above,
                    *auto_reset,
                    action,
                    state,
                    json!({ "condition": condition_src }),
                )
            }
            // Settled states step nowhere.
            (_, state) => (StepResult::default(), state),
        };

        if let Some(primitive) = self.primitives.get_mut(id) {
            primitive.state = new_state;
        }
        result
    }
}

fn step_sync(
    id: &PrimitiveId,
    t: Tick,
    sync_tick: Tick,
    animation_ids: &[tickloom_anim::AnimId],
) -> (StepResult, PrimitiveState) {
    if t < sync_tick {
        return (StepResult::default(), PrimitiveState::Pending);
    }
    let mut result = StepResult::default();
    result.events.push(
        CoordinationEvent::new(t, EventKind::SyncTriggered, id.clone())
            .with_payload(json!({ "animations": animation_ids })),
    );
    for animation in animation_ids {
        result.effects.push(SideEffect::StartAnimation {
            animation: animation.clone(),
            // Anchor at the declared sync tick so a late evaluation
            // still lines the animations up.
            at_tick: sync_tick,
        });
    }
    (result, PrimitiveState::Fired)
}

#[allow(clippy::too_many_arguments)]
fn step_barrier(
    id: &PrimitiveId,
    t: Tick,
    anim: &AnimationEngine,
    barrier_tick: Tick,
    waiting_ids: &[tickloom_anim::AnimId],
    dependents: &[tickloom_anim::AnimId],
    timeout_ticks: Option<Tick>,
    on_timeout: BarrierTimeoutPolicy,
) -> (StepResult, PrimitiveState) {
    if t < barrier_tick {
        return (StepResult::default(), PrimitiveState::Waiting);
    }
    let all_done = waiting_ids
        .iter()
        .all(|a| anim.is_completed_at(a, t));
    let timed_out = !all_done
        && timeout_ticks.is_some_and(|timeout| t >= barrier_tick + timeout);
    if !all_done && !timed_out {
        return (StepResult::default(), PrimitiveState::Waiting);
    }

    let mut result = StepResult::default();
    result.events.push(
        CoordinationEvent::new(t, EventKind::BarrierResolved, id.clone())
            .with_payload(json!({ "timeout": timed_out })),
    );

    let release =
        !timed_out || on_timeout == BarrierTimeoutPolicy::Release;
    if release && !dependents.is_empty() {
        // The release is a consequence of the resolution, so its sync
        // event follows the barrier event within the tick.
        result.cascade_events.push(
            CoordinationEvent::new(
                t,
                EventKind::SyncTriggered,
                PrimitiveId::new(format!("{id}.release")),
            )
            .with_payload(json!({ "animations": dependents })),
        );
        for animation in dependents {
            result.effects.push(SideEffect::StartAnimation {
                animation: animation.clone(),
                at_tick: t,
            });
        }
    }
    (result, PrimitiveState::Resolved { timed_out })
}

fn step_sequence(
    id: &PrimitiveId,
    t: Tick,
    anim: &AnimationEngine,
    start_tick: Option<Tick>,
    steps: &[crate::primitive::SequenceStep],
    state: PrimitiveState,
) -> (StepResult, PrimitiveState) {
    let (mut next_step, anchor) = match state {
        PrimitiveState::Idle => match start_tick {
            Some(start) if t >= start => (0, start),
            // Unanchored (or not yet due): waits for its tick or for a
            // trigger activation.
            _ => return (StepResult::default(), PrimitiveState::Idle),
        },
        PrimitiveState::Running {
            next_step,
            anchor_tick,
        } => (next_step, anchor_tick),
        settled => return (StepResult::default(), settled),
    };

    let mut result = StepResult::default();
    while next_step < steps.len()
        && t >= anchor + steps[next_step].offset_ticks
    {
        let step = &steps[next_step];
        let at_tick = anchor + step.offset_ticks;
        result.events.push(
            CoordinationEvent::new(t, EventKind::SequenceStepStarted, id.clone())
                .with_payload(json!({
                    "step": next_step,
                    "animation": step.animation_id,
                })),
        );
        result.effects.push(SideEffect::StartAnimation {
            animation: step.animation_id.clone(),
            at_tick,
        });
        next_step += 1;
    }

    if next_step >= steps.len() {
        // All steps started; the sequence completes when the last
        // step's animation does. An animation the engine doesn't know
        // completes immediately.
        let last = &steps[steps.len() - 1].animation_id;
        let last_started_at = anchor + steps[steps.len() - 1].offset_ticks;
        let last_done = if anim.contains(last) {
            anim.is_completed_at(last, t)
        } else {
            t > last_started_at
        };
        if last_done {
            result.cascade_events.push(CoordinationEvent::new(
                t,
                EventKind::SequenceCompleted,
                id.clone(),
            ));
            return (result, PrimitiveState::SequenceDone);
        }
    }

    (
        result,
        PrimitiveState::Running {
            next_step,
            anchor_tick: anchor,
        },
    )
}

fn step_trigger(
    id: &PrimitiveId,
    t: Tick,
    above: bool,
    auto_reset: bool,
    action: &TriggerAction,
    state: PrimitiveState,
    payload: serde_json::Value,
) -> (StepResult, PrimitiveState) {
    match state {
        PrimitiveState::Armed { was_above } => {
            if above && !was_above {
                let mut result = StepResult::default();
                result.events.push(
                    CoordinationEvent::new(
                        t,
                        EventKind::TriggerActivated,
                        id.clone(),
                    )
                    .with_payload(payload),
                );
                apply_action(action, t, &mut result);
                (result, PrimitiveState::Triggered)
            } else {
                (
                    StepResult::default(),
                    PrimitiveState::Armed { was_above: above },
                )
            }
        }
        PrimitiveState::Triggered => {
            if auto_reset && !above {
                let mut result = StepResult::default();
                result.events.push(CoordinationEvent::new(
                    t,
                    EventKind::TriggerReset,
                    id.clone(),
                ));
                (result, PrimitiveState::Armed { was_above: false })
            } else {
                (StepResult::default(), PrimitiveState::Triggered)
            }
        }
        other => (StepResult::default(), other),
    }
}

fn apply_action(action: &TriggerAction, t: Tick, result: &mut StepResult) {
    match action {
        TriggerAction::StartAnimations { animations } => {
            for animation in animations {
                result.effects.push(SideEffect::StartAnimation {
                    animation: animation.clone(),
                    at_tick: t,
                });
            }
        }
        TriggerAction::StopAnimations { animations } => {
            for animation in animations {
                result.effects.push(SideEffect::StopAnimation {
                    animation: animation.clone(),
                    at_tick: t,
                });
            }
        }
        TriggerAction::ActivatePrimitive { primitive } => {
            result.activations.push(primitive.clone());
        }
        TriggerAction::EventOnly => {}
    }
}
