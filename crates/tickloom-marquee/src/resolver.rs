//! The marquee resolver: programs in, position timelines out.
//!
//! Resolution is a pure function of the registered program set — given
//! identical programs it produces identical timelines, which is what
//! lets marquee positions participate in pre-computed frames.
//!
//! Pipeline:
//!
//! 1. **Scan** — collect which widget emits which event, and which
//!    widget waits on which.
//! 2. **Dependency graph** — edge "waiter depends on emitter";
//!    topological order via Kahn's algorithm.
//! 3. **Acyclic widgets** — symbolically execute bottom-up; each
//!    widget's `SYNC` ticks land in the event table before any waiter
//!    runs.
//! 4. **Cycles** — iterate symbolic execution to a fixed point under a
//!    bounded budget; unresolved events start at "never" (`WAIT_FOR`
//!    then uses its timeout) and the budget running out leaves exactly
//!    that behavior plus a [`MarqueeDiagnostic::NotConverged`].
//!
//! Infinite loops are unrolled to a horizon; a steady-state cycle is
//! detected from the trailing iterations so lookups never fall off the
//! end (see [`PositionTimeline::position_at`]).

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use tickloom_anim::Tick;

use crate::program::{
    LoopCount, MarqueeProgram, Statement, WidgetId,
};
use crate::timeline::{Cycle, PositionTimeline, Segment};
use crate::{MarqueeDiagnostic, MarqueeError};

/// Event name → ticks at which it occurs.
type EventTable = BTreeMap<String, BTreeSet<Tick>>;

/// Resolver tuning.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Fixed-point iteration budget for cyclic dependencies.
    pub fixed_point_iterations: u32,
    /// How far infinite loops are unrolled.
    pub unroll_horizon_ticks: Tick,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fixed_point_iterations: 16,
            unroll_horizon_ticks: 3600,
        }
    }
}

/// A resolved widget: its timeline plus the events it emits.
#[derive(Debug, Clone)]
struct CompiledWidget {
    timeline: PositionTimeline,
    emissions: EventTable,
}

/// Compiles marquee programs and answers `position_at`.
#[derive(Debug, Default)]
pub struct MarqueeResolver {
    config: ResolverConfig,
    programs: BTreeMap<WidgetId, MarqueeProgram>,
    compiled: BTreeMap<WidgetId, CompiledWidget>,
    dirty: BTreeSet<WidgetId>,
    diagnostics: Vec<MarqueeDiagnostic>,
}

impl MarqueeResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Registers or replaces a widget's program.
    ///
    /// Invalidates the widget and every widget that (transitively)
    /// waits on events it emits; they recompile on the next
    /// [`resolve`](Self::resolve).
    ///
    /// # Errors
    /// [`MarqueeError::InvalidProgram`] if validation fails; the
    /// existing program (if any) is kept.
    pub fn set_program(&mut self, program: MarqueeProgram) -> Result<(), MarqueeError> {
        program.validate()?;
        let widget = program.widget.clone();
        // Dependents of the *old* program's events are stale too, so
        // invalidate against both graphs.
        self.invalidate(&widget);
        self.programs.insert(widget.clone(), program);
        self.invalidate(&widget);
        Ok(())
    }

    /// Removes a widget's program and invalidates its dependents.
    ///
    /// # Errors
    /// [`MarqueeError::UnknownWidget`] for unknown ids.
    pub fn remove_program(&mut self, widget: &WidgetId) -> Result<(), MarqueeError> {
        if !self.programs.contains_key(widget) {
            return Err(MarqueeError::UnknownWidget(widget.clone()));
        }
        // Walk dependents while the widget's edges still exist.
        self.invalidate(widget);
        self.programs.remove(widget);
        self.compiled.remove(widget);
        self.dirty.remove(widget);
        Ok(())
    }

    /// Marks `widget` and all widgets downstream of its events dirty.
    fn invalidate(&mut self, widget: &WidgetId) {
        let deps = self.dependencies();
        // Loop control is a local visited set — the widget may already
        // be dirty and its dependents still need the walk.
        let mut visited: BTreeSet<WidgetId> = BTreeSet::new();
        let mut queue: VecDeque<WidgetId> = VecDeque::new();
        queue.push_back(widget.clone());
        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }
            self.dirty.insert(current.clone());
            for (waiter, emitters) in &deps {
                if emitters.contains(&current) {
                    queue.push_back(waiter.clone());
                }
            }
        }
    }

    /// Recompiles every dirty widget. Idempotent when nothing changed.
    pub fn resolve(&mut self) {
        if self.dirty.is_empty() {
            return;
        }
        self.diagnostics.clear();

        // Event table seeded from widgets that are staying as they are.
        let mut table: EventTable = BTreeMap::new();
        for (widget, compiled) in &self.compiled {
            if !self.dirty.contains(widget) {
                merge_emissions(&mut table, &compiled.emissions);
            }
        }

        let deps = self.dependencies();
        let (order, cyclic) = self.topo_order(&deps);

        // Acyclic widgets, dependency order.
        for widget in order {
            if !self.dirty.contains(&widget) {
                continue;
            }
            let compiled = self.execute(&widget, &table);
            merge_emissions(&mut table, &compiled.emissions);
            self.compiled.insert(widget, compiled);
        }

        // Cyclic widgets: bounded fixed point.
        if !cyclic.is_empty() {
            self.resolve_cycle(&cyclic, &mut table);
        }

        self.dirty.clear();
    }

    fn resolve_cycle(&mut self, cyclic: &BTreeSet<WidgetId>, table: &mut EventTable) {
        let budget = self.config.fixed_point_iterations.max(1);
        // Contributions from outside the cycle are fixed; each round
        // rebuilds only the cyclic widgets' emissions on top of them.
        let base_table = table.clone();
        let mut converged = false;
        for iteration in 0..budget {
            let mut next: BTreeMap<WidgetId, CompiledWidget> = BTreeMap::new();
            for widget in cyclic {
                if self.programs.contains_key(widget) {
                    next.insert(widget.clone(), self.execute(widget, table));
                }
            }
            let mut rebuilt = base_table.clone();
            for compiled in next.values() {
                merge_emissions(&mut rebuilt, &compiled.emissions);
            }
            let changed = rebuilt != *table;
            *table = rebuilt;
            for (widget, compiled) in next {
                self.compiled.insert(widget, compiled);
            }
            if !changed {
                tracing::debug!(iterations = iteration + 1, "marquee cycle converged");
                converged = true;
                break;
            }
        }

        if !converged {
            let unresolved: Vec<String> = cyclic
                .iter()
                .filter_map(|w| self.programs.get(w))
                .flat_map(|p| p.awaited_events())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            tracing::warn!(
                iterations = budget,
                ?unresolved,
                "marquee fixed point did not converge; timeout expiry used"
            );
            self.diagnostics.push(MarqueeDiagnostic::NotConverged {
                iterations: budget,
                unresolved_events: unresolved,
            });
        }
    }

    /// Resolver diagnostics from the last `resolve` call.
    pub fn diagnostics(&self) -> &[MarqueeDiagnostic] {
        &self.diagnostics
    }

    /// The compiled timeline for a widget.
    ///
    /// # Errors
    /// [`MarqueeError::UnknownWidget`] when no program is registered or
    /// the widget has not been resolved yet.
    pub fn timeline(&self, widget: &WidgetId) -> Result<&PositionTimeline, MarqueeError> {
        self.compiled
            .get(widget)
            .map(|c| &c.timeline)
            .ok_or_else(|| MarqueeError::UnknownWidget(widget.clone()))
    }

    /// Position of a widget at a tick.
    ///
    /// # Errors
    /// See [`timeline`](Self::timeline).
    pub fn position_at(
        &self,
        widget: &WidgetId,
        t: Tick,
    ) -> Result<(i32, i32), MarqueeError> {
        Ok(self.timeline(widget)?.position_at(t))
    }

    /// All resolved timelines, in widget order.
    pub fn timelines(
        &self,
    ) -> impl Iterator<Item = (&WidgetId, &PositionTimeline)> {
        self.compiled.iter().map(|(w, c)| (w, &c.timeline))
    }

    /// Ticks at which `event` occurs, across all resolved widgets.
    pub fn event_occurrences(&self, event: &str) -> BTreeSet<Tick> {
        let mut out = BTreeSet::new();
        for compiled in self.compiled.values() {
            if let Some(ticks) = compiled.emissions.get(event) {
                out.extend(ticks.iter().copied());
            }
        }
        out
    }

    /// `true` if any widget needs recompilation.
    pub fn has_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    // -----------------------------------------------------------------
    // Graph
    // -----------------------------------------------------------------

    /// waiter → set of widgets emitting an event it waits on.
    fn dependencies(&self) -> BTreeMap<WidgetId, BTreeSet<WidgetId>> {
        let mut emitters: BTreeMap<String, BTreeSet<WidgetId>> = BTreeMap::new();
        for (widget, program) in &self.programs {
            for event in program.emitted_events() {
                emitters.entry(event).or_default().insert(widget.clone());
            }
        }
        let mut deps: BTreeMap<WidgetId, BTreeSet<WidgetId>> = BTreeMap::new();
        for (widget, program) in &self.programs {
            let entry = deps.entry(widget.clone()).or_default();
            for event in program.awaited_events() {
                if let Some(sources) = emitters.get(&event) {
                    for source in sources {
                        // Waiting on your own event is not a graph edge.
                        if source != widget {
                            entry.insert(source.clone());
                        }
                    }
                }
            }
        }
        deps
    }

    /// Kahn's algorithm. Returns `(acyclic order, widgets in cycles)`.
    fn topo_order(
        &self,
        deps: &BTreeMap<WidgetId, BTreeSet<WidgetId>>,
    ) -> (Vec<WidgetId>, BTreeSet<WidgetId>) {
        let mut remaining: BTreeMap<WidgetId, BTreeSet<WidgetId>> = deps.clone();
        let mut order = Vec::new();
        loop {
            let ready: Vec<WidgetId> = remaining
                .iter()
                .filter(|(_, d)| d.iter().all(|dep| !remaining.contains_key(dep)))
                .map(|(w, _)| w.clone())
                .collect();
            if ready.is_empty() {
                break;
            }
            for widget in ready {
                remaining.remove(&widget);
                order.push(widget);
            }
        }
        let cyclic: BTreeSet<WidgetId> = remaining.into_keys().collect();
        (order, cyclic)
    }

    // -----------------------------------------------------------------
    // Symbolic execution
    // -----------------------------------------------------------------

    fn execute(&self, widget: &WidgetId, table: &EventTable) -> CompiledWidget {
        let program = &self.programs[widget];
        let mut exec = Executor {
            t: 0,
            pos: program.origin,
            segments: Vec::new(),
            emissions: BTreeMap::new(),
            table,
            horizon: self.config.unroll_horizon_ticks,
            iteration_marks: Vec::new(),
        };
        exec.run(&program.statements, 0);

        let cycle = detect_cycle(&exec.iteration_marks);
        let final_pos = exec.pos;
        CompiledWidget {
            timeline: PositionTimeline {
                widget: widget.clone(),
                anchor_tick: 0,
                segments: exec.segments,
                cycle,
                origin: program.origin,
                final_pos,
            },
            emissions: exec.emissions,
        }
    }
}

struct Executor<'a> {
    t: Tick,
    pos: (i32, i32),
    segments: Vec<Segment>,
    emissions: EventTable,
    table: &'a EventTable,
    horizon: Tick,
    /// `(tick, position)` at each top-level infinite-loop iteration
    /// start, for steady-state cycle detection.
    iteration_marks: Vec<(Tick, (i32, i32))>,
}

impl Executor<'_> {
    /// Executes statements; `depth` 0 marks the top level, where
    /// infinite-loop iteration boundaries are recorded.
    fn run(&mut self, statements: &[Statement], depth: u32) {
        for statement in statements {
            if self.t >= self.horizon {
                return;
            }
            match statement {
                Statement::Move {
                    direction,
                    distance,
                    step,
                    ticks_per_step,
                } => {
                    let steps = (distance + step - 1) / step; // ceil
                    let duration = Tick::from(steps) * ticks_per_step;
                    let (dx, dy) = direction.delta();
                    let to = (
                        self.pos.0 + dx * *distance as i32,
                        self.pos.1 + dy * *distance as i32,
                    );
                    self.segments.push(Segment {
                        from_tick: self.t,
                        duration,
                        from: self.pos,
                        to,
                        step_delta: (dx * *step as i32, dy * *step as i32),
                        ticks_per_step: *ticks_per_step,
                    });
                    self.t += duration;
                    self.pos = to;
                }
                Statement::Pause { ticks } => {
                    if *ticks > 0 {
                        self.segments
                            .push(Segment::hold(self.t, *ticks, self.pos));
                        self.t += ticks;
                    }
                }
                Statement::Sync { event } => {
                    self.emissions
                        .entry(event.clone())
                        .or_default()
                        .insert(self.t);
                }
                Statement::WaitFor {
                    event,
                    timeout_ticks,
                } => {
                    // Earliest known occurrence at or after now; an
                    // event nobody (yet) emits resolves to the timeout.
                    let occurrence = self
                        .table
                        .get(event)
                        .and_then(|ticks| ticks.range(self.t..).next())
                        .copied();
                    let gap = match occurrence {
                        Some(at) => at - self.t,
                        None => *timeout_ticks,
                    };
                    if gap > 0 {
                        self.segments
                            .push(Segment::hold(self.t, gap, self.pos));
                        self.t += gap;
                    }
                }
                Statement::Loop { count, body } => match count {
                    LoopCount::Finite(n) => {
                        for _ in 0..*n {
                            if self.t >= self.horizon {
                                break;
                            }
                            self.run(body, depth + 1);
                        }
                    }
                    LoopCount::Infinite => {
                        while self.t < self.horizon {
                            if depth == 0 {
                                self.iteration_marks.push((self.t, self.pos));
                            }
                            let before = self.t;
                            self.run(body, depth + 1);
                            if self.t == before {
                                // A zero-duration iteration would spin
                                // at one tick forever.
                                tracing::warn!(
                                    tick = self.t,
                                    "infinite marquee loop advances no ticks; stopping unroll"
                                );
                                return;
                            }
                        }
                    }
                },
            }
        }
    }
}

/// Detects a steady-state cycle from trailing iteration marks: the last
/// two completed iterations must agree on duration and drift.
fn detect_cycle(marks: &[(Tick, (i32, i32))]) -> Option<Cycle> {
    if marks.len() < 3 {
        return None;
    }
    let [a, b, c] = [
        marks[marks.len() - 3],
        marks[marks.len() - 2],
        marks[marks.len() - 1],
    ];
    let period_prev = b.0 - a.0;
    let period = c.0 - b.0;
    let drift_prev = (b.1 .0 - a.1 .0, b.1 .1 - a.1 .1);
    let drift = (c.1 .0 - b.1 .0, c.1 .1 - b.1 .1);
    if period > 0 && period == period_prev && drift == drift_prev {
        Some(Cycle {
            start_tick: b.0,
            period,
            drift,
        })
    } else {
        None
    }
}

/// Copies every occurrence in `from` into `into`.
fn merge_emissions(into: &mut EventTable, from: &EventTable) {
    for (event, ticks) in from {
        into.entry(event.clone())
            .or_default()
            .extend(ticks.iter().copied());
    }
}
