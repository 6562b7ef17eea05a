//! Coordination layer for Tickloom.
//!
//! Animations are pure functions of the tick; this crate is where they
//! relate to each other:
//!
//! - **Primitives** ([`PrimitiveSpec`]) — sync, barrier, sequence, and
//!   progress/data triggers, each a small state machine.
//! - **Events** ([`CoordinationEvent`]) — append-only facts with a
//!   total order `(tick, kind_rank, primitive_id)`.
//! - **Engine** ([`CoordinationEngine`]) — steps every primitive at a
//!   tick; `predict` simulates the future on clones.
//! - **Timeline** ([`Timeline`]) — groups primitives into plans, keeps
//!   the bounded event ring, and hands events to a hook.
//!
//! The engine never applies side effects itself. It *describes* them
//! ([`SideEffect`]) and the orchestrator applies them — that keeps
//! evaluation pure enough to run against cloned state for prediction.

mod engine;
mod error;
mod event;
mod primitive;
mod timeline;

pub use engine::{ConditionEval, CoordinationEngine, TickOutcome};
pub use error::CoordError;
pub use event::{CoordinationEvent, EventKind, PrimitiveId};
pub use primitive::{
    BarrierTimeoutPolicy, Primitive, PrimitiveSpec, PrimitiveState,
    SequenceStep, SideEffect, TriggerAction,
};
pub use timeline::{CoordinationPlan, EventHook, Timeline};
