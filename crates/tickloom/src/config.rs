//! Engine configuration.
//!
//! One validated struct; the core reads nothing else. Values arrive
//! from the application (or the `TICKLOOM_`-prefixed environment) and
//! go through [`TickloomConfig::validated`] before the engine sees
//! them — out-of-range values are clamped, not rejected, so a bad
//! knob degrades performance instead of refusing to boot.

use std::path::PathBuf;

use tickloom_anim::Tick;

/// Hard cap on pre-compute workers.
pub const MAX_WORKERS: usize = 8;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "TICKLOOM_";

/// Full engine configuration.
#[derive(Debug, Clone)]
pub struct TickloomConfig {
    /// Nominal frame rate. Used only for time↔tick conversion and for
    /// sizing defaults — the engine itself never reads a clock.
    pub fps: u32,
    /// Pre-compute worker threads (0 disables pre-computation).
    pub workers: usize,
    /// How far ahead of `now` workers compute frames.
    pub lookahead_ticks: Tick,
    /// Bound on the ordered frame cache.
    pub frame_cache_size: usize,
    /// Capacity of each named ring buffer.
    pub ring_buffer_capacity: usize,
    /// SQLite file path. `None` disables persistence.
    pub persistence_path: Option<PathBuf>,
    /// Rows older than `now − retention_ticks` are swept.
    pub retention_ticks: Tick,
    /// A state checkpoint is persisted every this many ticks.
    pub checkpoint_interval_ticks: Tick,
    /// Per-evaluation expression budget.
    pub expression_time_budget_ns: u64,
    /// Per-compiled-expression memory cap.
    pub expression_memory_budget_bytes: usize,
    /// Fixed-point budget for cyclic marquee dependencies.
    pub marquee_fixed_point_iterations: u32,
    /// How far infinite marquee loops are unrolled.
    pub marquee_unroll_horizon_ticks: Tick,
    /// Whether metric counters are persisted.
    pub metrics_enabled: bool,
}

impl Default for TickloomConfig {
    fn default() -> Self {
        let fps = 60;
        Self {
            fps,
            workers: num_cpus::get().saturating_sub(1).min(MAX_WORKERS),
            lookahead_ticks: Tick::from(fps) * 2,
            frame_cache_size: (fps as usize) * 2,
            ring_buffer_capacity: 256,
            persistence_path: None,
            retention_ticks: Tick::from(fps) * 600,
            checkpoint_interval_ticks: Tick::from(fps) * 10,
            expression_time_budget_ns: 10_000_000,
            expression_memory_budget_bytes: 64 * 1024,
            marquee_fixed_point_iterations: 16,
            marquee_unroll_horizon_ticks: Tick::from(fps) * 60,
            metrics_enabled: true,
        }
    }
}

impl TickloomConfig {
    /// Config for a specific frame rate, with rate-derived defaults.
    pub fn with_fps(fps: u32) -> Self {
        let fps = fps.max(1);
        Self {
            fps,
            lookahead_ticks: Tick::from(fps) * 2,
            frame_cache_size: (fps as usize) * 2,
            retention_ticks: Tick::from(fps) * 600,
            checkpoint_interval_ticks: Tick::from(fps) * 10,
            marquee_unroll_horizon_ticks: Tick::from(fps) * 60,
            ..Self::default()
        }
    }

    /// Clamps every field into its valid range.
    ///
    /// Rules:
    /// - `fps` at least 1.
    /// - `workers` capped to [`MAX_WORKERS`].
    /// - `frame_cache_size` at least 1; `lookahead_ticks` bounded by
    ///   the cache size (a frame we can't cache isn't worth computing).
    /// - Budgets and iteration counts at least 1.
    pub fn validated(mut self) -> Self {
        self.fps = self.fps.max(1);
        if self.workers > MAX_WORKERS {
            tracing::warn!(
                workers = self.workers,
                max = MAX_WORKERS,
                "workers exceeds maximum, clamping"
            );
            self.workers = MAX_WORKERS;
        }
        self.frame_cache_size = self.frame_cache_size.max(1);
        let cache = self.frame_cache_size as Tick;
        if self.lookahead_ticks > cache {
            tracing::warn!(
                lookahead = self.lookahead_ticks,
                cache = self.frame_cache_size,
                "lookahead exceeds frame cache, clamping"
            );
            self.lookahead_ticks = cache;
        }
        self.ring_buffer_capacity = self.ring_buffer_capacity.max(1);
        self.checkpoint_interval_ticks = self.checkpoint_interval_ticks.max(1);
        self.expression_time_budget_ns = self.expression_time_budget_ns.max(1);
        self.expression_memory_budget_bytes =
            self.expression_memory_budget_bytes.max(1024);
        self.marquee_fixed_point_iterations =
            self.marquee_fixed_point_iterations.max(1);
        self.marquee_unroll_horizon_ticks =
            self.marquee_unroll_horizon_ticks.max(1);
        self
    }

    /// Applies `TICKLOOM_*` environment overrides on top of `self`.
    ///
    /// Unparseable values are ignored with a warning — the environment
    /// can degrade a deployment, it can't brick one.
    pub fn with_env_overrides(mut self) -> Self {
        fn parse<T: std::str::FromStr>(key: &str) -> Option<T> {
            let full = format!("{ENV_PREFIX}{key}");
            let raw = std::env::var(&full).ok()?;
            match raw.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(var = %full, value = %raw, "ignoring unparseable override");
                    None
                }
            }
        }

        if let Some(v) = parse("FPS") {
            self.fps = v;
        }
        if let Some(v) = parse("WORKERS") {
            self.workers = v;
        }
        if let Some(v) = parse("LOOKAHEAD_TICKS") {
            self.lookahead_ticks = v;
        }
        if let Some(v) = parse("FRAME_CACHE_SIZE") {
            self.frame_cache_size = v;
        }
        if let Some(v) = parse("RING_BUFFER_CAPACITY") {
            self.ring_buffer_capacity = v;
        }
        if let Some(v) = parse::<String>("PERSISTENCE_PATH") {
            self.persistence_path = Some(PathBuf::from(v));
        }
        if let Some(v) = parse("RETENTION_TICKS") {
            self.retention_ticks = v;
        }
        if let Some(v) = parse("CHECKPOINT_INTERVAL_TICKS") {
            self.checkpoint_interval_ticks = v;
        }
        if let Some(v) = parse("EXPRESSION_TIME_BUDGET_NS") {
            self.expression_time_budget_ns = v;
        }
        if let Some(v) = parse("EXPRESSION_MEMORY_BUDGET_BYTES") {
            self.expression_memory_budget_bytes = v;
        }
        if let Some(v) = parse("MARQUEE_FIXED_POINT_ITERATIONS") {
            self.marquee_fixed_point_iterations = v;
        }
        if let Some(v) = parse("MARQUEE_UNROLL_HORIZON_TICKS") {
            self.marquee_unroll_horizon_ticks = v;
        }
        if let Some(v) = parse("METRICS_ENABLED") {
            self.metrics_enabled = v;
        }
        self
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_derive_from_fps() {
        let config = TickloomConfig::with_fps(30);
        assert_eq!(config.fps, 30);
        assert_eq!(config.lookahead_ticks, 60);
        assert_eq!(config.frame_cache_size, 60);
    }

    #[test]
    fn test_validated_clamps_workers_and_lookahead() {
        let config = TickloomConfig {
            workers: 64,
            lookahead_ticks: 10_000,
            frame_cache_size: 100,
            ..TickloomConfig::default()
        }
        .validated();
        assert_eq!(config.workers, MAX_WORKERS);
        assert_eq!(config.lookahead_ticks, 100);
    }

    #[test]
    fn test_validated_floors_zero_values() {
        let config = TickloomConfig {
            fps: 0,
            frame_cache_size: 0,
            ring_buffer_capacity: 0,
            marquee_fixed_point_iterations: 0,
            ..TickloomConfig::default()
        }
        .validated();
        assert_eq!(config.fps, 1);
        assert_eq!(config.frame_cache_size, 1);
        assert_eq!(config.ring_buffer_capacity, 1);
        assert_eq!(config.marquee_fixed_point_iterations, 1);
    }

    #[test]
    fn test_env_override_applies_and_ignores_garbage() {
        // Serialized by the env var names being unique to this test.
        unsafe {
            std::env::set_var("TICKLOOM_FPS", "24");
            std::env::set_var("TICKLOOM_WORKERS", "not-a-number");
        }
        let config = TickloomConfig::default().with_env_overrides();
        assert_eq!(config.fps, 24);
        // Garbage ignored, default kept.
        assert_eq!(config.workers, TickloomConfig::default().workers);
        unsafe {
            std::env::remove_var("TICKLOOM_FPS");
            std::env::remove_var("TICKLOOM_WORKERS");
        }
    }
}
