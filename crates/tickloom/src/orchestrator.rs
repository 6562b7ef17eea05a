//! The orchestrator: one pulse in, one frame out.
//!
//! The orchestrator is the single-threaded heart of the engine. The
//! external frame driver pulses it once per frame; each pulse runs the
//! fixed pipeline:
//!
//! ```text
//! ingest → dependency dispatch → coordination → effects →
//! frame (cache hit or synchronous) → tick advance →
//! persistence append → cache extension
//! ```
//!
//! It owns every sub-engine and is the only writer to any of them.
//! Worker threads see immutable snapshots; the persistence writer sees
//! a queue; the renderer sees a `&FrameState`. Nothing here blocks —
//! cache misses compute synchronously, full queues shed or defer.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use tickloom_anim::{
    AnimId, AnimationDef, AnimationEngine, CustomInterpFn, Tick,
};
use tickloom_coord::{
    CoordinationEvent, PrimitiveId, PrimitiveSpec, PrimitiveState,
    SideEffect, Timeline, TriggerAction,
};
use tickloom_data::{
    BindingSet, ChangeEvent, ChangeKind, DependencyManager, DrainCursor,
    RingBuffer, Sample,
};
use tickloom_expr::ExprLimits;
use tickloom_marquee::{
    MarqueeProgram, MarqueeResolver, ResolverConfig, WidgetId,
};
use tickloom_store::{
    AnimationRow, EnqueueError, PlanRow, Store, StoreWriter, WriteOp,
};

use crate::cache::{FrameCache, InsertOutcome};
use crate::config::TickloomConfig;
use crate::metrics::{bump, MetricsRegistry};
use crate::pool::FramePool;
use crate::snapshot::{EngineSnapshot, FrameState};
use crate::TickloomError;

/// Cap on deferred persistence ops kept across pulses.
const PENDING_WRITE_CAP: usize = 64;

/// Consecutive frame misses before the lookahead is halved.
const MISS_STREAK_LIMIT: u32 = 8;

/// The engine facade and per-pulse state machine.
pub struct Orchestrator {
    config: TickloomConfig,
    tick: Tick,
    anim: AnimationEngine,
    timeline: Timeline,
    marquee: MarqueeResolver,
    bindings: BindingSet,
    deps: DependencyManager,
    buffers: BTreeMap<String, RingBuffer>,
    cursors: BTreeMap<String, DrainCursor>,
    /// Latest bound parameter values, keyed by `(animation, parameter)`.
    parameters: BTreeMap<(AnimId, String), f64>,
    cache: FrameCache,
    pool: Option<FramePool>,
    snapshot_id: u64,
    metrics: Arc<MetricsRegistry>,
    writer: Option<StoreWriter>,
    pending_writes: VecDeque<WriteOp>,
    quiesced: bool,
    last_frame: FrameState,
    /// Adaptive lookahead; shrinks under sustained misses.
    lookahead: Tick,
    consecutive_misses: u32,
    /// Expression degradations already attributed to the metric.
    degraded_seen: u64,
    /// Ring drops already attributed to the metric.
    drops_seen: u64,
}

impl Orchestrator {
    /// Builds an engine from a validated config.
    ///
    /// # Errors
    /// [`TickloomError::Store`] when the persistence file cannot be
    /// opened or migrated.
    pub fn new(config: TickloomConfig) -> Result<Self, TickloomError> {
        let config = config.validated();

        let writer = match &config.persistence_path {
            Some(path) => Some(StoreWriter::spawn(Store::open(path)?)),
            None => None,
        };
        let pool = if config.workers > 0 {
            Some(FramePool::new(config.workers))
        } else {
            None
        };

        let bindings = BindingSet::new(
            ExprLimits {
                max_memory_bytes: config.expression_memory_budget_bytes,
                ..ExprLimits::default()
            },
            config.expression_time_budget_ns,
        );
        let marquee = MarqueeResolver::new(ResolverConfig {
            fixed_point_iterations: config.marquee_fixed_point_iterations,
            unroll_horizon_ticks: config.marquee_unroll_horizon_ticks,
        });

        tracing::info!(
            fps = config.fps,
            workers = config.workers,
            lookahead = config.lookahead_ticks,
            persistence = config.persistence_path.is_some(),
            "engine created"
        );

        Ok(Self {
            lookahead: config.lookahead_ticks,
            cache: FrameCache::new(config.frame_cache_size),
            tick: 0,
            anim: AnimationEngine::new(),
            timeline: Timeline::default(),
            marquee,
            bindings,
            deps: DependencyManager::new(),
            buffers: BTreeMap::new(),
            cursors: BTreeMap::new(),
            parameters: BTreeMap::new(),
            pool,
            snapshot_id: 0,
            metrics: Arc::new(MetricsRegistry::new()),
            writer,
            pending_writes: VecDeque::new(),
            quiesced: false,
            last_frame: FrameState {
                tick: 0,
                states: BTreeMap::new(),
                marquee: BTreeMap::new(),
                events: Vec::new(),
            },
            consecutive_misses: 0,
            degraded_seen: 0,
            drops_seen: 0,
            config,
        })
    }

    pub fn current_tick(&self) -> Tick {
        self.tick
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn config(&self) -> &TickloomConfig {
        &self.config
    }

    pub fn is_quiesced(&self) -> bool {
        self.quiesced
    }

    /// Latest value of a bound parameter.
    pub fn parameter(&self, animation: &AnimId, parameter: &str) -> Option<f64> {
        self.parameters
            .get(&(animation.clone(), parameter.to_string()))
            .copied()
    }

    // -----------------------------------------------------------------
    // Registration (refused when quiesced)
    // -----------------------------------------------------------------

    fn check_live(&self) -> Result<(), TickloomError> {
        if self.quiesced {
            Err(TickloomError::Quiesced)
        } else {
            Ok(())
        }
    }

    /// Registers an animation definition.
    ///
    /// # Errors
    /// [`TickloomError::Quiesced`] or the underlying validation error.
    pub fn register_animation(
        &mut self,
        def: AnimationDef,
    ) -> Result<AnimId, TickloomError> {
        self.check_live()?;
        let definition = serde_json::to_string(&def).unwrap_or_default();
        let id = self.anim.register(def)?;
        self.persist(WriteOp::AnimationUpsert(AnimationRow {
            animation_id: id.clone(),
            definition,
            active: false,
            start_tick: None,
            end_tick: None,
            updated_at: 0,
        }));
        self.invalidate_snapshot();
        Ok(id)
    }

    /// Registers a named pure interpolator for `custom` interpolation.
    pub fn register_interpolator(
        &mut self,
        name: impl Into<String>,
        f: CustomInterpFn,
    ) {
        self.anim.register_interpolator(name, f);
    }

    /// Starts an animation at the current tick.
    ///
    /// # Errors
    /// [`TickloomError::Quiesced`] or [`tickloom_anim::AnimError`].
    pub fn start_animation(&mut self, id: &AnimId) -> Result<(), TickloomError> {
        self.check_live()?;
        self.anim.start(id, self.tick)?;
        self.invalidate_snapshot();
        Ok(())
    }

    /// Stops an animation at the current tick.
    ///
    /// # Errors
    /// See [`start_animation`](Self::start_animation).
    pub fn stop_animation(&mut self, id: &AnimId) -> Result<(), TickloomError> {
        self.check_live()?;
        self.anim.stop(id, self.tick)?;
        self.invalidate_snapshot();
        Ok(())
    }

    /// Pauses an animation at the current tick.
    ///
    /// # Errors
    /// See [`start_animation`](Self::start_animation).
    pub fn pause_animation(&mut self, id: &AnimId) -> Result<(), TickloomError> {
        self.check_live()?;
        self.anim.pause(id, self.tick)?;
        self.invalidate_snapshot();
        Ok(())
    }

    /// Resumes an animation at the current tick.
    ///
    /// # Errors
    /// See [`start_animation`](Self::start_animation).
    pub fn resume_animation(&mut self, id: &AnimId) -> Result<(), TickloomError> {
        self.check_live()?;
        self.anim.resume(id, self.tick)?;
        self.invalidate_snapshot();
        Ok(())
    }

    /// Registers a standalone coordination primitive.
    ///
    /// # Errors
    /// [`TickloomError::Quiesced`] or [`tickloom_coord::CoordError`].
    pub fn register_primitive(
        &mut self,
        id: PrimitiveId,
        spec: PrimitiveSpec,
    ) -> Result<(), TickloomError> {
        self.check_live()?;
        self.timeline.register_primitive(id, spec)?;
        self.invalidate_snapshot();
        Ok(())
    }

    /// Registers a coordination plan.
    ///
    /// # Errors
    /// [`TickloomError::Quiesced`] or [`tickloom_coord::CoordError`].
    pub fn register_plan(
        &mut self,
        plan_id: impl Into<String>,
        primitives: Vec<(PrimitiveId, PrimitiveSpec)>,
    ) -> Result<(), TickloomError> {
        self.check_live()?;
        let plan_id = plan_id.into();
        let definition = serde_json::json!({
            "primitives": primitives
                .iter()
                .map(|(id, spec)| {
                    serde_json::json!({ "id": id, "spec": spec.descriptor() })
                })
                .collect::<Vec<_>>(),
        })
        .to_string();
        self.timeline.register_plan(plan_id.clone(), primitives)?;
        self.persist(WriteOp::PlanUpsert(PlanRow {
            plan_id,
            definition,
            state: Some("registered".to_string()),
            start_tick: Some(self.tick),
            completion_tick: None,
            active: true,
        }));
        self.invalidate_snapshot();
        Ok(())
    }

    /// Builds a data-trigger spec whose condition is compiled through
    /// the shared expression cache, and wires its variables into the
    /// dependency graph so fresh samples invalidate pre-computed
    /// frames.
    ///
    /// # Errors
    /// [`TickloomError::Quiesced`] or the compile error.
    pub fn data_trigger(
        &mut self,
        trigger_id: &PrimitiveId,
        condition: &str,
        variables: &[&str],
        auto_reset: bool,
        action: TriggerAction,
    ) -> Result<PrimitiveSpec, TickloomError> {
        self.check_live()?;
        let compiled = self.bindings.compile_condition(condition, variables)?;
        let observer = format!("trigger:{trigger_id}");
        for variable in variables {
            self.ensure_observable(variable, false);
            self.ensure_observable(&observer, true);
            let _ = self.deps.subscribe(observer.clone(), variable);
        }
        Ok(PrimitiveSpec::DataTrigger {
            condition_src: condition.to_string(),
            condition: compiled,
            auto_reset,
            action,
        })
    }

    /// Registers or replaces a widget's marquee program and resolves
    /// the timeline set eagerly.
    ///
    /// # Errors
    /// [`TickloomError::Quiesced`] or
    /// [`tickloom_marquee::MarqueeError`].
    pub fn set_marquee_program(
        &mut self,
        program: MarqueeProgram,
    ) -> Result<(), TickloomError> {
        self.check_live()?;
        self.marquee.set_program(program)?;
        self.marquee.resolve();
        for _ in self.marquee.diagnostics() {
            bump(&self.metrics.marquee_not_converged);
        }
        self.invalidate_snapshot();
        Ok(())
    }

    /// Position of a marquee widget at the current tick.
    ///
    /// # Errors
    /// [`tickloom_marquee::MarqueeError::UnknownWidget`].
    pub fn marquee_position(
        &self,
        widget: &WidgetId,
    ) -> Result<(i32, i32), TickloomError> {
        Ok(self.marquee.position_at(widget, self.tick)?)
    }

    /// Creates (or returns) a named ring buffer. The returned handle is
    /// the producer side; clone it into producer threads.
    pub fn create_buffer(&mut self, name: impl Into<String>) -> RingBuffer {
        let name = name.into();
        if let Some(existing) = self.buffers.get(&name) {
            return existing.clone();
        }
        let ring = RingBuffer::new(self.config.ring_buffer_capacity);
        self.cursors
            .insert(name.clone(), DrainCursor::new(ring.clone()));
        self.buffers.insert(name, ring.clone());
        ring
    }

    /// Pushes one sample into a named buffer. Non-blocking; returns
    /// `true` when an oldest unread sample was dropped to make room.
    ///
    /// # Errors
    /// [`tickloom_data::DataError`] for unknown buffers or oversized
    /// values.
    pub fn push_sample(
        &self,
        buffer_id: &str,
        name: &str,
        value: tickloom_data::SampleValue,
        observed_tick: Tick,
    ) -> Result<bool, TickloomError> {
        let ring = self
            .buffers
            .get(buffer_id)
            .ok_or_else(|| {
                tickloom_data::DataError::UnknownBuffer(buffer_id.to_string())
            })?;
        let sample = Sample::new(name, value, observed_tick)?;
        Ok(ring.push(sample))
    }

    /// Binds a data source to an animation parameter through a mapping
    /// expression (the sample binds to `value`).
    ///
    /// # Errors
    /// [`TickloomError::Quiesced`] or [`tickloom_data::DataError`].
    pub fn bind_data(
        &mut self,
        source: &str,
        animation_id: AnimId,
        parameter: &str,
        mapping_expr: &str,
    ) -> Result<(), TickloomError> {
        self.check_live()?;
        self.bindings
            .bind_data(source, animation_id.clone(), parameter, mapping_expr)?;
        self.wire_binding_observables(source, &animation_id, parameter);
        Ok(())
    }

    /// Binds a data source directly to a parameter, skipping the
    /// evaluator on the hot path.
    ///
    /// # Errors
    /// [`TickloomError::Quiesced`].
    pub fn bind_data_direct(
        &mut self,
        source: &str,
        animation_id: AnimId,
        parameter: &str,
    ) -> Result<(), TickloomError> {
        self.check_live()?;
        self.bindings
            .bind_data_direct(source, animation_id.clone(), parameter);
        self.wire_binding_observables(source, &animation_id, parameter);
        Ok(())
    }

    /// Binds an expression over named variables to a parameter.
    ///
    /// # Errors
    /// [`TickloomError::Quiesced`] or [`tickloom_data::DataError`].
    pub fn bind_expression(
        &mut self,
        animation_id: AnimId,
        parameter: &str,
        expr: &str,
        variables: &[&str],
    ) -> Result<(), TickloomError> {
        self.check_live()?;
        self.bindings
            .bind_expression(animation_id.clone(), parameter, expr, variables)?;
        for variable in variables {
            self.wire_binding_observables(variable, &animation_id, parameter);
        }
        Ok(())
    }

    fn wire_binding_observables(
        &mut self,
        source: &str,
        animation_id: &AnimId,
        parameter: &str,
    ) {
        self.ensure_observable(source, false);
        let target = format!("{animation_id}.{parameter}");
        self.ensure_observable(&target, true);
        let _ = self.deps.subscribe(target, source);
    }

    fn ensure_observable(&mut self, name: &str, visible: bool) {
        if !self.deps.is_registered(name) {
            let _ = self.deps.register_observable(name, visible);
        }
    }

    /// Marks the engine quiesced: the last good frame is served
    /// unchanged and registrations are refused.
    pub fn quiesce(&mut self) {
        if !self.quiesced {
            tracing::error!(tick = self.tick, "engine quiesced");
            self.quiesced = true;
        }
    }

    // -----------------------------------------------------------------
    // The pulse
    // -----------------------------------------------------------------

    /// Runs one tick of the pipeline and returns the frame to render.
    ///
    /// Exactly one frame per pulse, with a strictly increasing tick.
    /// Never blocks; a cache miss computes the frame synchronously.
    pub fn on_tick_pulse(&mut self) -> &FrameState {
        if self.quiesced {
            return &self.last_frame;
        }
        let t = self.tick;
        let started = Instant::now();

        // 1. Ingest.
        let samples = self.drain_buffers(t);

        // 2. Bindings and dependency notifications.
        let (updates, changed) = self.bindings.apply_samples(&samples);
        for variable in &changed {
            self.deps.note_change(ChangeEvent {
                kind: ChangeKind::DataSample,
                source: variable.clone(),
                data: None,
            });
        }
        for update in updates {
            self.parameters.insert(
                (update.animation_id, update.parameter),
                update.value,
            );
        }
        self.account_degradations();

        // 3. Dispatch; a change reaching anything widget-visible kills
        // the pre-computed future.
        let dispatch = self.deps.dispatch(t);
        if dispatch.snapshot_invalidated {
            self.invalidate_snapshot();
        }

        // 4. Coordination, then its side effects.
        let outcome = {
            let bindings = &self.bindings;
            self.timeline
                .evaluate_at(t, &self.anim, &|expr| bindings.eval_condition(expr))
        };
        for effect in &outcome.effects {
            match effect {
                SideEffect::StartAnimation { animation, at_tick } => {
                    let _ = self.anim.start(animation, *at_tick);
                }
                SideEffect::StopAnimation { animation, at_tick } => {
                    let _ = self.anim.stop(animation, *at_tick);
                }
            }
        }

        // 5. The frame: cache hit or synchronous computation.
        let frame = match self.cache.take(t) {
            Some(cached) => {
                if cached.events == outcome.events {
                    bump(&self.metrics.cache_hits);
                    cached
                } else {
                    // A cached frame disagreeing with live evaluation
                    // is a broken invariant, not a recoverable miss.
                    tracing::error!(
                        tick = t,
                        "cached frame diverged from live evaluation"
                    );
                    self.quiesce();
                    self.compute_frame_sync(t, outcome.events.clone())
                }
            }
            None => {
                bump(&self.metrics.cache_misses);
                self.compute_frame_sync(t, outcome.events.clone())
            }
        };

        // 6. Persistence (append-only, off-thread).
        self.flush_pending_writes();
        if !outcome.events.is_empty() {
            self.persist(WriteOp::Events(outcome.events));
        }
        if !samples.is_empty() {
            self.persist(WriteOp::DataSamples(samples));
        }
        if t > 0 && t % self.config.checkpoint_interval_ticks == 0 {
            let snapshot = self.checkpoint_bytes();
            self.persist(WriteOp::Checkpoint { tick: t, snapshot });
            self.persist(WriteOp::RetentionSweep {
                horizon_tick: t.saturating_sub(self.config.retention_ticks),
            });
            if self.config.metrics_enabled {
                for (kind, value) in self.metrics.snapshot() {
                    self.persist(WriteOp::Metric {
                        tick: t,
                        kind: kind.to_string(),
                        value: value as f64,
                    });
                }
            }
        }

        // 7. Budget accounting and tick advance.
        self.account_frame_budget(started.elapsed());
        self.tick = t + 1;

        // 8. Extend pre-computed coverage.
        self.absorb_pool_results();
        self.extend_coverage();

        self.last_frame = frame;
        &self.last_frame
    }

    fn drain_buffers(&mut self, t: Tick) -> Vec<Sample> {
        let mut samples = Vec::new();
        for cursor in self.cursors.values_mut() {
            samples.extend(cursor.drain_for_tick(t));
        }
        // Attribute overflow drops since the last pulse.
        let total_drops: u64 =
            self.buffers.values().map(RingBuffer::dropped_count).sum();
        while self.drops_seen < total_drops {
            bump(&self.metrics.sample_dropped);
            self.drops_seen += 1;
        }
        samples
    }

    fn account_degradations(&mut self) {
        let total = self.bindings.degraded_count();
        while self.degraded_seen < total {
            bump(&self.metrics.expr_eval_error);
            self.degraded_seen += 1;
        }
    }

    fn account_frame_budget(&mut self, elapsed: Duration) {
        let budget = Duration::from_secs_f64(1.0 / f64::from(self.config.fps));
        if elapsed > budget {
            bump(&self.metrics.frame_missed);
            self.consecutive_misses += 1;
            if self.consecutive_misses >= MISS_STREAK_LIMIT {
                let floor = Tick::from(self.config.fps / 4).max(1);
                let reduced = (self.lookahead / 2).max(floor);
                if reduced < self.lookahead {
                    tracing::warn!(
                        from = self.lookahead,
                        to = reduced,
                        "sustained frame misses, reducing lookahead"
                    );
                    self.lookahead = reduced;
                }
                self.consecutive_misses = 0;
            }
        } else {
            self.consecutive_misses = 0;
            // Creep back toward the configured lookahead.
            if self.lookahead < self.config.lookahead_ticks {
                self.lookahead += 1;
            }
        }
    }

    fn compute_frame_sync(
        &self,
        t: Tick,
        events: Vec<CoordinationEvent>,
    ) -> FrameState {
        let marquee = self
            .marquee
            .timelines()
            .map(|(widget, timeline)| (widget.clone(), timeline.position_at(t)))
            .collect();
        FrameState {
            tick: t,
            states: self.anim.frame_state(t),
            marquee,
            events,
        }
    }

    fn invalidate_snapshot(&mut self) {
        self.snapshot_id += 1;
        self.cache.invalidate(self.snapshot_id);
    }

    fn absorb_pool_results(&mut self) {
        let Some(pool) = &self.pool else { return };
        for result in pool.drain_results() {
            match self.cache.insert(result.tick, result.snapshot_id, result.frame)
            {
                InsertOutcome::StaleSnapshot => {
                    bump(&self.metrics.snapshot_mismatch);
                }
                InsertOutcome::Inserted
                | InsertOutcome::Duplicate
                | InsertOutcome::TooOld
                | InsertOutcome::Overflow => {}
            }
        }
    }

    fn extend_coverage(&mut self) {
        let Some(pool) = &self.pool else { return };
        // Saturation check: beyond 2 × workers queued, drop the
        // extension attempt entirely.
        if pool.queue_len() >= pool.worker_count() * 2 {
            return;
        }
        let base = self.tick.saturating_sub(1);
        let snapshot = Arc::new(self.take_snapshot(base));
        for tick in self.tick..=(base + self.lookahead) {
            if self.cache.contains(tick) {
                continue;
            }
            if !pool.request(tick, Arc::clone(&snapshot)) {
                break; // saturated mid-extension
            }
        }
    }

    fn take_snapshot(&self, base_tick: Tick) -> EngineSnapshot {
        EngineSnapshot::new(
            self.snapshot_id,
            base_tick,
            self.anim.clone(),
            self.timeline.engine().clone(),
            self.bindings.variables().clone(),
            self.marquee
                .timelines()
                .map(|(w, tl)| (w.clone(), tl.clone()))
                .collect(),
            self.config.expression_time_budget_ns,
        )
    }

    // -----------------------------------------------------------------
    // Persistence plumbing
    // -----------------------------------------------------------------

    fn persist(&mut self, op: WriteOp) {
        let Some(writer) = &self.writer else { return };
        match writer.enqueue(op) {
            Ok(()) => {}
            Err(EnqueueError::Full(op)) => {
                bump(&self.metrics.persistence_lagging);
                if !op.is_sheddable() {
                    if self.pending_writes.len() >= PENDING_WRITE_CAP {
                        self.pending_writes.pop_front();
                    }
                    self.pending_writes.push_back(op);
                }
            }
            Err(EnqueueError::Gone) => {
                tracing::error!("persistence writer gone; writes disabled");
                self.writer = None;
            }
        }
    }

    fn flush_pending_writes(&mut self) {
        while let Some(op) = self.pending_writes.pop_front() {
            let Some(writer) = &self.writer else { return };
            match writer.enqueue(op) {
                Ok(()) => {}
                Err(EnqueueError::Full(op)) => {
                    self.pending_writes.push_front(op);
                    return;
                }
                Err(EnqueueError::Gone) => {
                    self.writer = None;
                    return;
                }
            }
        }
    }

    // -----------------------------------------------------------------
    // Checkpoint / restore
    // -----------------------------------------------------------------

    /// Serializes the engine state for checkpointing.
    pub fn checkpoint_bytes(&self) -> Vec<u8> {
        let doc = CheckpointDoc {
            tick: self.tick,
            anim: self.anim.snapshot().unwrap_or_default(),
            coord_states: self.timeline.states_snapshot(),
            parameters: self
                .parameters
                .iter()
                .map(|((id, param), value)| {
                    (format!("{id}\u{1f}{param}"), *value)
                })
                .collect(),
        };
        serde_json::to_vec(&doc).unwrap_or_default()
    }

    /// Restores engine state from a checkpoint.
    ///
    /// Definitions, plans, programs, and bindings must already be
    /// registered (they are configuration, not state); the checkpoint
    /// carries lifecycle state, primitive states, parameters, and the
    /// tick counter. Replaying persisted events is unnecessary — the
    /// checkpoint already contains their accumulated effect, and
    /// subsequent pulses recompute everything else.
    ///
    /// # Errors
    /// [`TickloomError::Anim`] when the snapshot does not match the
    /// registered definitions.
    pub fn restore_checkpoint(&mut self, bytes: &[u8]) -> Result<(), TickloomError> {
        let doc: CheckpointDoc = serde_json::from_slice(bytes)
            .map_err(tickloom_store::StoreError::CorruptPayload)?;
        self.anim.restore(&doc.anim)?;
        self.timeline.restore_states(doc.coord_states);
        self.parameters = doc
            .parameters
            .into_iter()
            .filter_map(|(key, value)| {
                let (id, param) = key.split_once('\u{1f}')?;
                Some(((AnimId::new(id), param.to_string()), value))
            })
            .collect();
        self.tick = doc.tick;
        self.invalidate_snapshot();
        Ok(())
    }

    /// Stops workers and flushes persistence. Call at the end of the
    /// session; dropping without it still joins threads, best-effort.
    pub fn shutdown(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown();
        }
        if let Some(writer) = self.writer.take() {
            writer.shutdown();
        }
        tracing::info!(tick = self.tick, "engine stopped");
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("tick", &self.tick)
            .field("snapshot_id", &self.snapshot_id)
            .field("quiesced", &self.quiesced)
            .finish_non_exhaustive()
    }
}

/// On-disk checkpoint layout.
#[derive(Serialize, Deserialize)]
struct CheckpointDoc {
    tick: Tick,
    /// Animation engine snapshot bytes (deterministic JSON).
    anim: Vec<u8>,
    coord_states: BTreeMap<PrimitiveId, PrimitiveState>,
    /// `(animation, parameter)` flattened with a unit separator.
    parameters: BTreeMap<String, f64>,
}
