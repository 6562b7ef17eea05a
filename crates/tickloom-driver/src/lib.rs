//! Frame pacing for Tickloom.
//!
//! The engine consumes pulses; something outside it decides when a
//! pulse is due. This crate paces pulses on a fixed deadline grid:
//! deadlines are lattice points `anchor + n × frame`, fixed when the
//! driver is built (plus an optional caller-chosen phase offset).
//! Anchoring to a grid instead of rescheduling relative to "now" keeps
//! long runs drift-free — ten thousand pulses later the deadlines still
//! sit on the same 16.6 ms lattice they started on.
//!
//! When the render loop cannot keep up, whole lattice slots are
//! abandoned: the deadline jumps forward in frame-sized steps, never to
//! an arbitrary instant, so the grid phase survives an overload. The
//! engine's tick counter advances once per *delivered* pulse; abandoned
//! slots stretch wall time without ever corrupting tick time, which is
//! the contract a deterministic engine needs from its clock source.
//!
//! Load is a duty cycle — pulse cost over frame budget — averaged
//! across a sliding window and classified into [`LoadLevel`]s. The
//! driver logs level *transitions*, not every expensive frame.
//!
//! # Integration
//!
//! ```ignore
//! let mut driver = FrameDriver::new(DriverConfig::with_fps(60));
//! loop {
//!     let pulse = driver.next_pulse().await;
//!     let frame = engine.on_tick_pulse();
//!     renderer.present(frame);
//!     driver.finish_pulse();
//! }
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::time::{self, Instant as TokioInstant};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Driver configuration. Out-of-range values are clamped at
/// construction.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Pulse rate in Hz (`1..=MAX_FPS`).
    pub fps: u32,
    /// Phase offset applied to the deadline grid. Two engines sharing
    /// a host (say, two panels on one board) can be staggered by half
    /// a frame deliberately and reproducibly — there is no randomness
    /// anywhere in the pacer.
    pub start_offset: Duration,
    /// How many recent pulses the duty-cycle window covers.
    pub load_window: usize,
}

impl DriverConfig {
    /// Maximum supported pulse rate.
    pub const MAX_FPS: u32 = 240;

    pub fn with_fps(fps: u32) -> Self {
        Self {
            fps,
            ..Self::default()
        }
    }

    /// Duration of one grid slot.
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.fps.clamp(1, Self::MAX_FPS)))
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            fps: 60,
            start_offset: Duration::ZERO,
            load_window: 32,
        }
    }
}

// ---------------------------------------------------------------------------
// Load levels
// ---------------------------------------------------------------------------

/// Coarse render-load classification, derived from the windowed duty
/// cycle. Ordered: each level is strictly heavier than the previous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadLevel {
    /// Duty below 25% — plenty of headroom.
    Idle,
    /// Duty below 65% — the steady state for a healthy scene.
    Nominal,
    /// Duty below 100% — frames still fit, barely. A good moment for
    /// the engine to shrink its lookahead.
    Strained,
    /// Duty at or past 100% — pulses cost more than a frame; slots are
    /// being abandoned.
    Saturated,
}

impl LoadLevel {
    /// Classifies a duty-cycle fraction.
    pub fn from_duty(duty: f64) -> Self {
        if duty >= 1.0 {
            Self::Saturated
        } else if duty >= 0.65 {
            Self::Strained
        } else if duty >= 0.25 {
            Self::Nominal
        } else {
            Self::Idle
        }
    }
}

impl std::fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Nominal => "nominal",
            Self::Strained => "strained",
            Self::Saturated => "saturated",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Pulses
// ---------------------------------------------------------------------------

/// One delivered pulse.
#[derive(Debug, Clone, Copy)]
pub struct Pulse {
    /// Count of delivered pulses, starting at 1.
    pub ordinal: u64,
    /// Grid slots abandoned immediately before this pulse (0 when the
    /// loop is keeping up).
    pub slots_lost: u64,
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// Grid-anchored pulse pacer. One per engine.
pub struct FrameDriver {
    fps: u32,
    frame: Duration,
    window: usize,
    /// The next lattice point a pulse is due at.
    next_deadline: TokioInstant,
    ordinal: u64,
    slots_lost: u64,
    paused_since: Option<TokioInstant>,
    /// Set when a pulse is handed out, consumed by `finish_pulse`.
    pulse_started: Option<Instant>,
    /// Recent pulse costs, oldest first. Bounded by `window`.
    costs: VecDeque<Duration>,
    cost_sum: Duration,
    level: LoadLevel,
}

impl FrameDriver {
    pub fn new(config: DriverConfig) -> Self {
        let fps = config.fps.clamp(1, DriverConfig::MAX_FPS);
        if fps != config.fps {
            warn!(
                requested = config.fps,
                using = fps,
                "fps outside 1..={}, clamped",
                DriverConfig::MAX_FPS
            );
        }
        let window = config.load_window.clamp(1, 1024);
        let frame = Duration::from_secs_f64(1.0 / f64::from(fps));

        debug!(
            fps,
            frame_us = frame.as_micros() as u64,
            offset_us = config.start_offset.as_micros() as u64,
            "frame driver ready"
        );

        Self {
            fps,
            frame,
            window,
            next_deadline: TokioInstant::now() + frame + config.start_offset,
            ordinal: 0,
            slots_lost: 0,
            paused_since: None,
            pulse_started: None,
            costs: VecDeque::with_capacity(window),
            cost_sum: Duration::ZERO,
            level: LoadLevel::Idle,
        }
    }

    pub fn with_fps(fps: u32) -> Self {
        Self::new(DriverConfig::with_fps(fps))
    }

    /// `n` grid slots as a duration.
    fn slots(&self, n: u64) -> Duration {
        Duration::from_nanos((self.frame.as_nanos() as u64).saturating_mul(n))
    }

    /// Waits for the next lattice point and hands out a pulse.
    ///
    /// While paused this future never resolves; inside a
    /// `tokio::select!` the other branches keep running.
    pub async fn next_pulse(&mut self) -> Pulse {
        if self.paused_since.is_some() {
            return std::future::pending().await;
        }

        time::sleep_until(self.next_deadline).await;

        // Abandon every slot the loop failed to service. The deadline
        // only ever moves in whole frames, so the lattice phase is
        // preserved across an overload.
        let lag = TokioInstant::now().saturating_duration_since(self.next_deadline);
        let lost = lag.as_nanos() as u64 / self.frame.as_nanos().max(1) as u64;
        if lost > 0 {
            self.next_deadline += self.slots(lost);
            self.slots_lost += lost;
            warn!(
                ordinal = self.ordinal + 1,
                lost,
                lag_ms = lag.as_secs_f64() * 1000.0,
                "frame slots abandoned"
            );
        }
        self.next_deadline += self.frame;

        self.ordinal += 1;
        self.pulse_started = Some(Instant::now());
        Pulse {
            ordinal: self.ordinal,
            slots_lost: lost,
        }
    }

    /// Records that the pulse handler finished and folds its cost into
    /// the duty window. Skipping this call disables load tracking but
    /// nothing else.
    pub fn finish_pulse(&mut self) {
        let Some(started) = self.pulse_started.take() else {
            return;
        };
        let cost = started.elapsed();
        self.costs.push_back(cost);
        self.cost_sum += cost;
        while self.costs.len() > self.window {
            if let Some(oldest) = self.costs.pop_front() {
                self.cost_sum = self.cost_sum.saturating_sub(oldest);
            }
        }

        let level = LoadLevel::from_duty(self.duty());
        if level != self.level {
            if level > self.level {
                warn!(
                    duty = format!("{:.2}", self.duty()),
                    from = %self.level,
                    to = %level,
                    "render load rising"
                );
            } else {
                debug!(from = %self.level, to = %level, "render load easing");
            }
            self.level = level;
        }
    }

    /// Fraction of the frame budget consumed, averaged over the window.
    /// 0.0 until the first `finish_pulse`.
    pub fn duty(&self) -> f64 {
        if self.costs.is_empty() {
            return 0.0;
        }
        self.cost_sum.as_secs_f64()
            / (self.frame.as_secs_f64() * self.costs.len() as f64)
    }

    /// Current load classification.
    pub fn load_level(&self) -> LoadLevel {
        self.level
    }

    /// Stops handing out pulses. Idempotent.
    pub fn pause(&mut self) {
        if self.paused_since.is_none() {
            self.paused_since = Some(TokioInstant::now());
            debug!(ordinal = self.ordinal, "frame driver paused");
        }
    }

    /// Resumes pulsing. The grid shifts forward past the paused span
    /// in whole slots, so the first post-resume deadline is the next
    /// free lattice point — no burst, no phase break. Idempotent.
    pub fn resume(&mut self) {
        if let Some(since) = self.paused_since.take() {
            let span = TokioInstant::now().saturating_duration_since(since);
            let shift = span.as_nanos() as u64 / self.frame.as_nanos().max(1) as u64 + 1;
            self.next_deadline += self.slots(shift);
            debug!(
                ordinal = self.ordinal,
                paused_slots = shift,
                "frame driver resumed"
            );
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }

    /// Delivered pulses so far.
    pub fn pulses(&self) -> u64 {
        self.ordinal
    }

    /// Grid slots abandoned since startup.
    pub fn total_slots_lost(&self) -> u64 {
        self.slots_lost
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn frame_duration(&self) -> Duration {
        self.frame
    }
}

impl std::fmt::Debug for FrameDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDriver")
            .field("fps", &self.fps)
            .field("pulses", &self.ordinal)
            .field("slots_lost", &self.slots_lost)
            .field("level", &self.level)
            .field("paused", &self.paused_since.is_some())
            .finish()
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn driver_at(fps: u32) -> FrameDriver {
        FrameDriver::new(DriverConfig {
            fps,
            ..DriverConfig::default()
        })
    }

    #[test]
    fn test_fps_and_window_are_clamped() {
        assert_eq!(driver_at(0).fps(), 1);
        assert_eq!(driver_at(100_000).fps(), DriverConfig::MAX_FPS);

        let tiny_window = FrameDriver::new(DriverConfig {
            load_window: 0,
            ..DriverConfig::default()
        });
        // A zero window would make duty() divide by zero.
        tiny_window.duty();
    }

    #[test]
    fn test_load_level_boundaries() {
        assert_eq!(LoadLevel::from_duty(0.0), LoadLevel::Idle);
        assert_eq!(LoadLevel::from_duty(0.24), LoadLevel::Idle);
        assert_eq!(LoadLevel::from_duty(0.25), LoadLevel::Nominal);
        assert_eq!(LoadLevel::from_duty(0.64), LoadLevel::Nominal);
        assert_eq!(LoadLevel::from_duty(0.65), LoadLevel::Strained);
        assert_eq!(LoadLevel::from_duty(0.99), LoadLevel::Strained);
        assert_eq!(LoadLevel::from_duty(1.0), LoadLevel::Saturated);
        assert_eq!(LoadLevel::from_duty(3.0), LoadLevel::Saturated);
        // The ordering the transition logging relies on.
        assert!(LoadLevel::Idle < LoadLevel::Nominal);
        assert!(LoadLevel::Strained < LoadLevel::Saturated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pulses_follow_the_grid() {
        let mut driver = driver_at(10);
        for expected in 1..=5 {
            let pulse = driver.next_pulse().await;
            assert_eq!(pulse.ordinal, expected);
            assert_eq!(pulse.slots_lost, 0);
            driver.finish_pulse();
        }
        assert_eq!(driver.pulses(), 5);
        assert_eq!(driver.total_slots_lost(), 0);
        // Near-zero handler cost reads as idle.
        assert_eq!(driver.load_level(), LoadLevel::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_slots_preserve_grid_phase() {
        // 10 Hz grid: deadlines at 100 ms, 200 ms, 300 ms, …
        let mut driver = driver_at(10);
        driver.next_pulse().await; // consumes the 100 ms slot

        // The handler stalls for 3.5 slots.
        tokio::time::advance(Duration::from_millis(350)).await;

        // The 200 ms and 300 ms slots are gone; the 400 ms one fires
        // late but the 500 ms one is back on the lattice.
        let pulse = driver.next_pulse().await;
        assert_eq!(pulse.ordinal, 2);
        assert_eq!(pulse.slots_lost, 2);

        let pulse = driver.next_pulse().await;
        assert_eq!(pulse.ordinal, 3);
        assert_eq!(pulse.slots_lost, 0);
        assert_eq!(driver.total_slots_lost(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_driver_never_pulses() {
        let mut driver = driver_at(10);
        driver.pause();
        assert!(driver.is_paused());

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            driver.next_pulse(),
        )
        .await;
        assert!(result.is_err(), "paused driver must not pulse");
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_lands_on_the_next_free_lattice_point() {
        let mut driver = driver_at(10);
        driver.next_pulse().await;
        driver.pause();
        tokio::time::advance(Duration::from_secs(1)).await;
        driver.resume();

        // No catch-up burst for the paused second, and nothing counted
        // as lost — those slots were suspended, not missed.
        let pulse = driver.next_pulse().await;
        assert_eq!(pulse.ordinal, 2);
        assert_eq!(pulse.slots_lost, 0);
        assert_eq!(driver.total_slots_lost(), 0);
    }

    #[test]
    fn test_finish_pulse_without_a_pulse_is_noop() {
        let mut driver = driver_at(60);
        driver.finish_pulse();
        assert_eq!(driver.duty(), 0.0);
        assert_eq!(driver.load_level(), LoadLevel::Idle);
    }

    #[test]
    fn test_duty_window_is_bounded() {
        let mut driver = FrameDriver::new(DriverConfig {
            fps: 60,
            load_window: 4,
            ..DriverConfig::default()
        });
        for _ in 0..20 {
            driver.pulse_started = Some(Instant::now());
            driver.finish_pulse();
        }
        assert!(driver.costs.len() <= 4);
    }
}
