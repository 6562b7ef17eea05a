//! Animation layer for Tickloom.
//!
//! This crate is the deterministic heart of the framework:
//!
//! - **Easing & interpolation** ([`Easing`], `lerp_*`) — pure curves and
//!   value blending.
//! - **Definitions** ([`AnimationDef`], [`AnimationDefBuilder`]) —
//!   immutable, builder-validated animation recipes.
//! - **Engine** ([`AnimationEngine`]) — lifecycle plus the pure
//!   `state_at(id, tick)` evaluation and deterministic snapshots.
//!
//! # Architecture
//!
//! Everything above this crate (coordination, timeline, frame pool)
//! treats `state_at` as an oracle: give it a tick, get back exactly the
//! same state every time, on every thread. Nothing in this crate reads
//! a clock; ticks come in from the outside.
//!
//! ```text
//! Definitions (immutable) + Runtime (tick-valued) → state_at(tick)
//! ```

mod def;
mod easing;
mod engine;
mod error;
mod state;

pub use def::{
    AnimId, AnimKind, AnimationDef, AnimationDefBuilder, InterpolationMode,
    PreStartBehavior, PropertySet, Tick,
};
pub use easing::{lerp_f, lerp_i, lerp_pos, lerp_rgb, Easing, Rgb};
pub use engine::{AnimationEngine, CustomInterpFn};
pub use error::AnimError;
pub use state::AnimationState;
