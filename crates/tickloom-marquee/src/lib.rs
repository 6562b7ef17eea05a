//! Marquee movement for Tickloom.
//!
//! Widgets that scroll, bounce, or chase each other describe their
//! motion in a tiny imperative language (MOVE / LOOP / SYNC / WAIT_FOR
//! / PAUSE). This crate compiles those programs into per-widget
//! [`PositionTimeline`]s:
//!
//! - **Programs** ([`MarqueeProgram`], [`Statement`]) — motion as data.
//! - **Resolver** ([`MarqueeResolver`]) — symbolic execution with
//!   cross-widget SYNC/WAIT_FOR resolution: topological order for the
//!   acyclic part, bounded fixed-point iteration for cycles.
//! - **Timelines** ([`PositionTimeline`]) — `position_at(tick)` in
//!   `O(log segments)` integer arithmetic, with steady-state cycle
//!   wrapping for infinite loops.
//!
//! The resolver is a pure function of the program set: identical
//! programs produce identical timelines, on every run and every thread.

mod error;
mod program;
mod resolver;
mod timeline;

pub use error::{MarqueeDiagnostic, MarqueeError};
pub use program::{
    Direction, LoopCount, MarqueeProgram, Statement, WidgetId,
};
pub use resolver::{MarqueeResolver, ResolverConfig};
pub use timeline::{Cycle, PositionTimeline, Segment};
