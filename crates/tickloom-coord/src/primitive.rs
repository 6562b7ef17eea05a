//! Coordination primitives: the five temporal relations.
//!
//! Each primitive is a tagged variant ([`PrimitiveSpec`]) with a small
//! state machine ([`PrimitiveState`]). Specs are immutable after
//! registration; all mutation lives in the state, which is what the
//! engine clones for prediction.
//!
//! State machines:
//!
//! ```text
//! Sync:      Pending ──(tick ≥ sync_tick)──→ Fired
//! Barrier:   Waiting ──(all completed)─────→ Resolved
//!                    └─(timeout expired)───→ Resolved (timeout=true)
//! Sequence:  Idle ──→ Running ──(last anim done)──→ Completed
//! Trigger:   Armed ⇄ Fired            (⇄ only with auto_reset)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tickloom_anim::{AnimId, Tick};
use tickloom_expr::CompiledExpr;

use crate::event::PrimitiveId;
use crate::CoordError;

// ---------------------------------------------------------------------------
// Actions & side effects
// ---------------------------------------------------------------------------

/// What a trigger does when it fires.
///
/// Actions are data, not code: they may enqueue animation lifecycle
/// changes or activate another primitive, and nothing else. No clock,
/// no I/O — the orchestrator applies them between coordination and
/// frame computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum TriggerAction {
    /// Start the listed animations at the firing tick.
    StartAnimations { animations: Vec<AnimId> },
    /// Stop the listed animations at the firing tick.
    StopAnimations { animations: Vec<AnimId> },
    /// Re-anchor another primitive (typically a sequence) to the firing
    /// tick and reset it to its initial state.
    ActivatePrimitive { primitive: PrimitiveId },
    /// Emit the event only; no side effect.
    EventOnly,
}

/// A side effect produced by evaluation, applied by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    StartAnimation { animation: AnimId, at_tick: Tick },
    StopAnimation { animation: AnimId, at_tick: Tick },
}

/// Whether a timed-out barrier still releases its dependents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum BarrierTimeoutPolicy {
    /// Release dependents with a `timeout: true` payload. The default.
    #[default]
    Release,
    /// Resolve without releasing anything.
    Cancel,
}

// ---------------------------------------------------------------------------
// Specs
// ---------------------------------------------------------------------------

/// One step of a sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub offset_ticks: Tick,
    pub animation_id: AnimId,
}

/// The immutable definition of a primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveSpec {
    /// All listed animations are started together at `sync_tick`.
    Sync {
        sync_tick: Tick,
        animation_ids: Vec<AnimId>,
    },
    /// Fires once every `waiting_ids` animation has completed, from
    /// `barrier_tick` onwards; `timeout_ticks` bounds the wait.
    Barrier {
        barrier_tick: Tick,
        waiting_ids: Vec<AnimId>,
        dependents: Vec<AnimId>,
        timeout_ticks: Option<Tick>,
        on_timeout: BarrierTimeoutPolicy,
    },
    /// Starts each step's animation at `start_tick + offset`.
    /// `start_tick: None` means the sequence only runs when activated
    /// by a trigger action, anchored at the activation tick.
    Sequence {
        start_tick: Option<Tick>,
        steps: Vec<SequenceStep>,
    },
    /// Fires when the watched animation's progress crosses `threshold`
    /// from below.
    ProgressTrigger {
        animation_id: AnimId,
        threshold: f64,
        auto_reset: bool,
        action: TriggerAction,
    },
    /// Fires when the condition expression flips to `true`.
    DataTrigger {
        /// Source text, kept for persistence and diagnostics.
        condition_src: String,
        condition: Arc<CompiledExpr>,
        auto_reset: bool,
        action: TriggerAction,
    },
}

impl PrimitiveSpec {
    /// Validates the spec against its id.
    ///
    /// # Errors
    /// [`CoordError::InvalidPrimitive`] for empty animation sets, a
    /// threshold outside `[0, 1]`, or a sequence without steps.
    pub(crate) fn validate(&self, id: &PrimitiveId) -> Result<(), CoordError> {
        let fail = |reason: &str| {
            Err(CoordError::InvalidPrimitive {
                id: id.clone(),
                reason: reason.to_string(),
            })
        };
        match self {
            Self::Sync { animation_ids, .. } if animation_ids.is_empty() => {
                fail("sync lists no animations")
            }
            Self::Barrier { waiting_ids, .. } if waiting_ids.is_empty() => {
                fail("barrier waits on no animations")
            }
            Self::Sequence { steps, .. } if steps.is_empty() => {
                fail("sequence has no steps")
            }
            Self::ProgressTrigger { threshold, .. }
                if !(0.0..=1.0).contains(threshold) =>
            {
                fail("threshold outside [0, 1]")
            }
            _ => Ok(()),
        }
    }

    /// A JSON description of the spec, used by persistence.
    ///
    /// Compiled conditions are represented by their source text — the
    /// compiled AST is rebuilt on load, never stored.
    pub fn descriptor(&self) -> serde_json::Value {
        use serde_json::json;
        match self {
            Self::Sync {
                sync_tick,
                animation_ids,
            } => json!({
                "type": "sync",
                "sync_tick": sync_tick,
                "animations": animation_ids,
            }),
            Self::Barrier {
                barrier_tick,
                waiting_ids,
                dependents,
                timeout_ticks,
                on_timeout,
            } => json!({
                "type": "barrier",
                "barrier_tick": barrier_tick,
                "waiting": waiting_ids,
                "dependents": dependents,
                "timeout_ticks": timeout_ticks,
                "on_timeout": on_timeout,
            }),
            Self::Sequence { start_tick, steps } => json!({
                "type": "sequence",
                "start_tick": start_tick,
                "steps": steps,
            }),
            Self::ProgressTrigger {
                animation_id,
                threshold,
                auto_reset,
                action,
            } => json!({
                "type": "progress_trigger",
                "animation": animation_id,
                "threshold": threshold,
                "auto_reset": auto_reset,
                "action": action,
            }),
            Self::DataTrigger {
                condition_src,
                auto_reset,
                action,
                ..
            } => json!({
                "type": "data_trigger",
                "condition": condition_src,
                "auto_reset": auto_reset,
                "action": action,
            }),
        }
    }

    /// The initial state for this spec.
    pub(crate) fn initial_state(&self) -> PrimitiveState {
        match self {
            Self::Sync { .. } => PrimitiveState::Pending,
            Self::Barrier { .. } => PrimitiveState::Waiting,
            Self::Sequence { .. } => PrimitiveState::Idle,
            Self::ProgressTrigger { .. } | Self::DataTrigger { .. } => {
                PrimitiveState::Armed { was_above: false }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// The mutable state of a primitive.
///
/// Variants are shared across primitive kinds where the shape matches;
/// the engine only ever pairs a state with its own spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum PrimitiveState {
    /// Sync: not yet fired.
    Pending,
    /// Sync: fired.
    Fired,
    /// Barrier: waiting for completions.
    Waiting,
    /// Barrier: resolved (possibly by timeout).
    Resolved { timed_out: bool },
    /// Sequence: not yet anchored/started.
    Idle,
    /// Sequence: steps up to `next_step` have started.
    Running {
        /// Index of the next step to start.
        next_step: usize,
        /// The tick the sequence is anchored at (start_tick, or the
        /// activation tick if re-anchored by a trigger).
        anchor_tick: Tick,
    },
    /// Sequence: all steps started and the last animation completed.
    SequenceDone,
    /// Trigger: watching for the condition to become true.
    /// `was_above` tracks the previous observation for edge detection.
    Armed { was_above: bool },
    /// Trigger: fired; waits for auto-reset (or stays here forever).
    Triggered,
}

/// A registered primitive: spec + current state.
#[derive(Debug, Clone)]
pub struct Primitive {
    pub id: PrimitiveId,
    pub spec: PrimitiveSpec,
    pub state: PrimitiveState,
}

impl Primitive {
    pub fn new(id: PrimitiveId, spec: PrimitiveSpec) -> Self {
        let state = spec.initial_state();
        Self { id, spec, state }
    }

    /// `true` once the primitive can no longer emit events (absent an
    /// external re-activation).
    pub fn is_settled(&self) -> bool {
        match (&self.spec, &self.state) {
            (_, PrimitiveState::Fired)
            | (_, PrimitiveState::Resolved { .. })
            | (_, PrimitiveState::SequenceDone) => true,
            (
                PrimitiveSpec::ProgressTrigger { auto_reset, .. }
                | PrimitiveSpec::DataTrigger { auto_reset, .. },
                PrimitiveState::Triggered,
            ) => !auto_reset,
            _ => false,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
