//! Position timelines: the compiled output of a marquee program.
//!
//! A timeline is a contiguous run of segments starting at the anchor
//! tick. Each segment moves in fixed pixel steps on a fixed tick
//! cadence, so `position_at` is integer arithmetic — no floats, no
//! rounding-mode questions, bit-identical everywhere.
//!
//! Programs with an infinite loop settle into a steady cycle once their
//! cross-widget waits stabilize; the timeline records that cycle
//! (period + per-cycle position drift) so lookups beyond the unrolled
//! horizon wrap instead of extrapolating.

use serde::{Deserialize, Serialize};

use tickloom_anim::Tick;

use crate::program::WidgetId;

/// One movement segment: `steps` happen every `ticks_per_step` ticks,
/// each adding `step_delta` to the position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub from_tick: Tick,
    /// Ticks this segment covers; the next segment starts at
    /// `from_tick + duration`.
    pub duration: Tick,
    pub from: (i32, i32),
    /// Position reached at the end of the segment.
    pub to: (i32, i32),
    /// Pixel delta applied per completed step. Zero for pauses/waits.
    pub step_delta: (i32, i32),
    pub ticks_per_step: Tick,
}

impl Segment {
    /// A motionless segment (pause or wait gap).
    pub fn hold(from_tick: Tick, duration: Tick, at: (i32, i32)) -> Self {
        Self {
            from_tick,
            duration,
            from: at,
            to: at,
            step_delta: (0, 0),
            ticks_per_step: 1,
        }
    }

    pub fn end_tick(&self) -> Tick {
        self.from_tick + self.duration
    }

    /// Position within the segment at tick `t` (callers guarantee
    /// `from_tick <= t < end_tick`). Stepwise, clamped to `to`.
    fn position_at(&self, t: Tick) -> (i32, i32) {
        let steps_done = ((t - self.from_tick) / self.ticks_per_step) as i32;
        let x = self.from.0 + self.step_delta.0 * steps_done;
        let y = self.from.1 + self.step_delta.1 * steps_done;
        // The last step of a move may be shorter than `step`; never
        // run past the declared endpoint.
        (clamp_toward(x, self.from.0, self.to.0), clamp_toward(y, self.from.1, self.to.1))
    }
}

/// Clamps `v` to the closed range spanned by `a` and `b` regardless of
/// direction of travel.
fn clamp_toward(v: i32, a: i32, b: i32) -> i32 {
    if a <= b { v.clamp(a, b) } else { v.clamp(b, a) }
}

/// Steady-state repetition of a timeline's tail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cycle {
    /// First tick of the repeating window.
    pub start_tick: Tick,
    /// Length of one repetition.
    pub period: Tick,
    /// Position drift accumulated per repetition.
    pub drift: (i32, i32),
}

/// A widget's compiled position function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionTimeline {
    pub widget: WidgetId,
    pub anchor_tick: Tick,
    /// Contiguous segments from the anchor. May be empty for a program
    /// that never moves.
    pub segments: Vec<Segment>,
    /// Present when the program repeats forever in steady state.
    pub cycle: Option<Cycle>,
    /// Position before the anchor and after the last segment (absent a
    /// cycle).
    pub origin: (i32, i32),
    pub final_pos: (i32, i32),
}

impl PositionTimeline {
    /// The widget's position at tick `t`. Total: every tick has a
    /// position.
    ///
    /// Lookup is a binary search over segments, `O(log S)`; ticks past
    /// the covered range wrap through the cycle when there is one, and
    /// hold the final position otherwise.
    pub fn position_at(&self, t: Tick) -> (i32, i32) {
        if t < self.anchor_tick || self.segments.is_empty() {
            return self.origin;
        }
        let end = self.segments[self.segments.len() - 1].end_tick();
        if t < end {
            return self.lookup(t);
        }
        match self.cycle {
            Some(cycle) if cycle.period > 0 => {
                let past = t - cycle.start_tick;
                let wraps = past / cycle.period;
                let folded = cycle.start_tick + past % cycle.period;
                let base = if folded < end {
                    self.lookup(folded)
                } else {
                    self.final_pos
                };
                (
                    base.0 + cycle.drift.0 * wraps as i32,
                    base.1 + cycle.drift.1 * wraps as i32,
                )
            }
            _ => self.final_pos,
        }
    }

    /// Binary search for the segment containing `t`.
    fn lookup(&self, t: Tick) -> (i32, i32) {
        let index = self
            .segments
            .partition_point(|segment| segment.end_tick() <= t);
        match self.segments.get(index) {
            Some(segment) if t >= segment.from_tick => segment.position_at(t),
            _ => self.final_pos,
        }
    }

    /// Last tick covered by explicit segments (exclusive).
    pub fn covered_until(&self) -> Tick {
        self.segments
            .last()
            .map_or(self.anchor_tick, Segment::end_tick)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn move_segment(
        from_tick: Tick,
        duration: Tick,
        from: (i32, i32),
        to: (i32, i32),
        step_delta: (i32, i32),
        ticks_per_step: Tick,
    ) -> Segment {
        Segment {
            from_tick,
            duration,
            from,
            to,
            step_delta,
            ticks_per_step,
        }
    }

    fn timeline(segments: Vec<Segment>, cycle: Option<Cycle>) -> PositionTimeline {
        let final_pos = segments.last().map_or((0, 0), |s| s.to);
        PositionTimeline {
            widget: WidgetId::new("w"),
            anchor_tick: 0,
            segments,
            cycle,
            origin: (0, 0),
            final_pos,
        }
    }

    #[test]
    fn test_position_within_single_move() {
        let tl = timeline(
            vec![move_segment(0, 100, (0, 0), (-100, 0), (-1, 0), 1)],
            None,
        );
        assert_eq!(tl.position_at(0), (0, 0));
        assert_eq!(tl.position_at(37), (-37, 0));
        assert_eq!(tl.position_at(99), (-99, 0));
        // Past the end without a cycle: hold final.
        assert_eq!(tl.position_at(100), (-100, 0));
        assert_eq!(tl.position_at(10_000), (-100, 0));
    }

    #[test]
    fn test_stepwise_cadence() {
        // 2 px every 3 ticks.
        let tl = timeline(
            vec![move_segment(0, 15, (0, 0), (10, 0), (2, 0), 3)],
            None,
        );
        assert_eq!(tl.position_at(0), (0, 0));
        assert_eq!(tl.position_at(2), (0, 0));
        assert_eq!(tl.position_at(3), (2, 0));
        assert_eq!(tl.position_at(7), (4, 0));
        assert_eq!(tl.position_at(14), (8, 0));
    }

    #[test]
    fn test_partial_last_step_clamps_to_endpoint() {
        // 3 px per tick toward 10: steps land at 3, 6, 9, then clamp.
        let tl = timeline(
            vec![move_segment(0, 4, (0, 0), (10, 0), (3, 0), 1)],
            None,
        );
        assert_eq!(tl.position_at(3), (9, 0));
        assert_eq!(tl.position_at(4), (10, 0));
    }

    #[test]
    fn test_binary_search_across_segments() {
        let tl = timeline(
            vec![
                move_segment(0, 10, (0, 0), (10, 0), (1, 0), 1),
                Segment::hold(10, 5, (10, 0)),
                move_segment(15, 10, (10, 0), (10, 10), (0, 1), 1),
            ],
            None,
        );
        assert_eq!(tl.position_at(5), (5, 0));
        assert_eq!(tl.position_at(12), (10, 0));
        assert_eq!(tl.position_at(18), (10, 3));
    }

    #[test]
    fn test_cycle_wrap_with_drift() {
        // One 100-tick leftward sweep per cycle, drifting -100 x.
        let tl = PositionTimeline {
            cycle: Some(Cycle {
                start_tick: 0,
                period: 100,
                drift: (-100, 0),
            }),
            ..timeline(
                vec![move_segment(0, 100, (0, 0), (-100, 0), (-1, 0), 1)],
                None,
            )
        };
        assert_eq!(tl.position_at(50), (-50, 0));
        // Second cycle: folded position plus one drift.
        assert_eq!(tl.position_at(150), (-150, 0));
        assert_eq!(tl.position_at(250), (-250, 0));
    }

    #[test]
    fn test_before_anchor_is_origin() {
        let mut tl = timeline(
            vec![move_segment(10, 5, (3, 3), (8, 3), (1, 0), 1)],
            None,
        );
        tl.anchor_tick = 10;
        tl.origin = (3, 3);
        assert_eq!(tl.position_at(0), (3, 3));
        assert_eq!(tl.position_at(9), (3, 3));
    }
}
