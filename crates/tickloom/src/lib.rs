//! # Tickloom
//!
//! A tick-based deterministic animation and coordination engine for
//! small displays on constrained hardware.
//!
//! Time inside the engine is an integer tick advanced by an external
//! frame driver — never a clock. Every animation state, coordination
//! event, and marquee position is a pure function of the tick and the
//! registered configuration, which is what lets a pool of workers
//! compute future frames in parallel and get bit-identical results.
//!
//! ```text
//!                    ┌────────────────────────────┐
//!  pulse ──────────▶ │        Orchestrator        │ ──▶ FrameState
//!                    │  ingest → deps → coord →   │
//!  samples ──▶ rings │  frame → advance → persist │ ──▶ SQLite (off-thread)
//!                    └─────────────┬──────────────┘
//!                                  │ snapshots
//!                          ┌───────▼───────┐
//!                          │  frame pool   │ ──▶ ordered frame cache
//!                          └───────────────┘
//! ```
//!
//! The sub-crates do the work; this crate wires them together:
//! `tickloom-anim` (easing + animation engine), `tickloom-expr`
//! (sandboxed expressions), `tickloom-data` (ring buffers, dependency
//! graph, bindings), `tickloom-coord` (primitives + timeline),
//! `tickloom-marquee` (movement DSL), `tickloom-store` (persistence).

mod cache;
mod config;
mod error;
mod metrics;
mod orchestrator;
mod pool;
mod snapshot;

pub use cache::{FrameCache, InsertOutcome};
pub use config::{TickloomConfig, ENV_PREFIX, MAX_WORKERS};
pub use error::TickloomError;
pub use metrics::MetricsRegistry;
pub use orchestrator::Orchestrator;
pub use pool::{FramePool, FrameResult};
pub use snapshot::{EngineSnapshot, FrameState};

// Re-export the sub-crate surfaces applications touch.
pub use tickloom_anim::{
    lerp_f, lerp_i, lerp_pos, lerp_rgb, AnimError, AnimId, AnimKind,
    AnimationDef, AnimationDefBuilder, AnimationEngine, AnimationState,
    Easing, InterpolationMode, PreStartBehavior, PropertySet, Rgb, Tick,
};
pub use tickloom_coord::{
    BarrierTimeoutPolicy, CoordError, CoordinationEvent, EventKind,
    PrimitiveId, PrimitiveSpec, PrimitiveState, SequenceStep, SideEffect,
    Timeline, TriggerAction,
};
pub use tickloom_data::{
    BindingSet, DataError, DependencyManager, RingBuffer, Sample,
    SampleValue,
};
pub use tickloom_expr::{ExprError, ExprLimits, Value};
pub use tickloom_marquee::{
    Direction, LoopCount, MarqueeDiagnostic, MarqueeError, MarqueeProgram,
    MarqueeResolver, PositionTimeline, ResolverConfig, Statement, WidgetId,
};
pub use tickloom_store::{Store, StoreError, StoreWriter, WriteOp};

use std::time::Duration;

/// Converts a user-facing duration to ticks at the given rate, rounding
/// to the nearest tick (minimum 1 for non-zero durations).
///
/// This is the only place seconds exist; the core is tick-pure.
pub fn ticks_from_duration(duration: Duration, fps: u32) -> Tick {
    if duration.is_zero() {
        return 0;
    }
    let ticks = (duration.as_secs_f64() * f64::from(fps.max(1))).round() as Tick;
    ticks.max(1)
}

/// Converts ticks back to wall time at the given rate.
pub fn duration_from_ticks(ticks: Tick, fps: u32) -> Duration {
    Duration::from_secs_f64(ticks as f64 / f64::from(fps.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_from_duration_round_trip() {
        assert_eq!(ticks_from_duration(Duration::from_secs(1), 60), 60);
        assert_eq!(ticks_from_duration(Duration::from_millis(500), 60), 30);
        assert_eq!(ticks_from_duration(Duration::ZERO, 60), 0);
        // Sub-tick durations still take one tick.
        assert_eq!(ticks_from_duration(Duration::from_millis(1), 60), 1);

        assert_eq!(duration_from_ticks(60, 60), Duration::from_secs(1));
        assert_eq!(duration_from_ticks(30, 60), Duration::from_millis(500));
    }
}
