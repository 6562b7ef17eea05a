//! The marquee movement language.
//!
//! A widget's movement is an imperative program — move, pause, loop,
//! emit an event, wait for another widget's event. Programs are data
//! (serde-derived), validated once, then compiled by the resolver into
//! a position timeline. Nothing here executes; execution is the
//! resolver's job.

use std::fmt;

use serde::{Deserialize, Serialize};

use tickloom_anim::Tick;

use crate::MarqueeError;

/// Identifies one widget's program and timeline.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WidgetId(pub String);

impl WidgetId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WidgetId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Movement direction in display coordinates (x grows right, y grows
/// down).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Unit delta per pixel of travel.
    pub fn delta(&self) -> (i32, i32) {
        match self {
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
            Self::Up => (0, -1),
            Self::Down => (0, 1),
        }
    }
}

/// Loop repetition count.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum LoopCount {
    Finite(u32),
    Infinite,
}

/// One statement of a marquee program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Statement {
    /// Move `distance` pixels, `step` pixels every `ticks_per_step`
    /// ticks.
    Move {
        direction: Direction,
        distance: u32,
        step: u32,
        ticks_per_step: Tick,
    },
    /// Repeat the body.
    Loop {
        count: LoopCount,
        body: Vec<Statement>,
    },
    /// Emit `event` at the current tick. Takes no time.
    Sync { event: String },
    /// Block until the earliest occurrence of `event`; if no occurrence
    /// can be resolved, wait `timeout_ticks` instead.
    WaitFor {
        event: String,
        timeout_ticks: Tick,
    },
    /// Hold position for `ticks`.
    Pause { ticks: Tick },
}

impl Statement {
    /// Convenience constructor with the common 1 px / 1 tick cadence.
    pub fn step_move(direction: Direction, distance: u32) -> Self {
        Self::Move {
            direction,
            distance,
            step: 1,
            ticks_per_step: 1,
        }
    }
}

/// A widget's program plus its starting position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarqueeProgram {
    pub widget: WidgetId,
    pub origin: (i32, i32),
    pub statements: Vec<Statement>,
}

impl MarqueeProgram {
    /// Creates a program anchored at `(0, 0)`.
    pub fn new(widget: impl Into<WidgetId>, statements: Vec<Statement>) -> Self {
        Self {
            widget: widget.into(),
            origin: (0, 0),
            statements,
        }
    }

    pub fn with_origin(mut self, x: i32, y: i32) -> Self {
        self.origin = (x, y);
        self
    }

    /// Validates the program.
    ///
    /// # Errors
    /// [`MarqueeError::InvalidProgram`] for zero-distance or zero-step
    /// moves, zero-cadence moves, empty loop bodies, or a zero wait
    /// timeout.
    pub fn validate(&self) -> Result<(), MarqueeError> {
        fn walk(
            widget: &WidgetId,
            statements: &[Statement],
        ) -> Result<(), MarqueeError> {
            let fail = |reason: &str| {
                Err(MarqueeError::InvalidProgram {
                    widget: widget.clone(),
                    reason: reason.to_string(),
                })
            };
            for statement in statements {
                match statement {
                    Statement::Move {
                        distance,
                        step,
                        ticks_per_step,
                        ..
                    } => {
                        if *distance == 0 {
                            return fail("move distance must be > 0");
                        }
                        if *step == 0 {
                            return fail("move step must be > 0");
                        }
                        if *ticks_per_step == 0 {
                            return fail("move ticks_per_step must be > 0");
                        }
                    }
                    Statement::Loop { body, .. } => {
                        if body.is_empty() {
                            return fail("loop body is empty");
                        }
                        walk(widget, body)?;
                    }
                    Statement::WaitFor { timeout_ticks, .. } => {
                        if *timeout_ticks == 0 {
                            return fail("wait_for timeout must be > 0");
                        }
                    }
                    Statement::Sync { .. } | Statement::Pause { .. } => {}
                }
            }
            Ok(())
        }
        walk(&self.widget, &self.statements)
    }

    /// Event names this program emits, in first-appearance order.
    pub fn emitted_events(&self) -> Vec<String> {
        fn walk(statements: &[Statement], out: &mut Vec<String>) {
            for statement in statements {
                match statement {
                    Statement::Sync { event } => {
                        if !out.contains(event) {
                            out.push(event.clone());
                        }
                    }
                    Statement::Loop { body, .. } => walk(body, out),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.statements, &mut out);
        out
    }

    /// Event names this program waits on, in first-appearance order.
    pub fn awaited_events(&self) -> Vec<String> {
        fn walk(statements: &[Statement], out: &mut Vec<String>) {
            for statement in statements {
                match statement {
                    Statement::WaitFor { event, .. } => {
                        if !out.contains(event) {
                            out.push(event.clone());
                        }
                    }
                    Statement::Loop { body, .. } => walk(body, out),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.statements, &mut out);
        out
    }
}

// =========================================================================
// Tests
// =========================================================================
