//! The timeline: plans, the in-memory event ring, and the side-effect
//! hand-off.
//!
//! A plan is an ordered group of primitives registered under one name —
//! "boot_intro" might be two fades, a barrier, and a sequence. The
//! timeline owns the coordination engine, keeps the last N events in a
//! bounded ring for inspection and persistence, and hands every event
//! to an optional hook. The hook observes; it must not mutate the
//! engine — side effects travel separately in the [`TickOutcome`] so
//! the orchestrator applies them in order.

use std::collections::{BTreeMap, VecDeque};

use tickloom_anim::{AnimationEngine, Tick};

use crate::engine::{ConditionEval, CoordinationEngine, TickOutcome};
use crate::event::{CoordinationEvent, PrimitiveId};
use crate::primitive::{PrimitiveSpec, PrimitiveState};
use crate::CoordError;

/// Default capacity of the in-memory event ring.
const DEFAULT_EVENT_RING: usize = 1024;

/// Observes events as they are appended. Side-effect free by contract.
pub type EventHook = Box<dyn FnMut(&CoordinationEvent) + Send>;

/// A named, ordered group of primitives.
#[derive(Debug, Clone)]
pub struct CoordinationPlan {
    pub id: String,
    /// Primitive ids in registration order.
    pub primitives: Vec<PrimitiveId>,
}

/// Owns plans, the coordination engine, and the event ring.
pub struct Timeline {
    engine: CoordinationEngine,
    plans: BTreeMap<String, CoordinationPlan>,
    events: VecDeque<CoordinationEvent>,
    event_capacity: usize,
    hook: Option<EventHook>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_RING)
    }
}

impl Timeline {
    /// Creates a timeline whose event ring holds `event_capacity`
    /// events before dropping the oldest.
    pub fn new(event_capacity: usize) -> Self {
        Self {
            engine: CoordinationEngine::new(),
            plans: BTreeMap::new(),
            events: VecDeque::new(),
            event_capacity: event_capacity.max(1),
            hook: None,
        }
    }

    /// Sets the event hook, replacing any previous one.
    pub fn set_event_hook(&mut self, hook: EventHook) {
        self.hook = Some(hook);
    }

    /// Registers a plan: each `(id, spec)` pair goes into the engine,
    /// and the plan remembers the grouping.
    ///
    /// # Errors
    /// Fails on the first invalid or duplicate primitive; primitives
    /// registered before the failure stay registered, the plan is not
    /// recorded.
    pub fn register_plan(
        &mut self,
        plan_id: impl Into<String>,
        primitives: Vec<(PrimitiveId, PrimitiveSpec)>,
    ) -> Result<(), CoordError> {
        let plan_id = plan_id.into();
        let mut ids = Vec::with_capacity(primitives.len());
        for (id, spec) in primitives {
            self.engine.register(id.clone(), spec)?;
            ids.push(id);
        }
        tracing::info!(plan = %plan_id, primitives = ids.len(), "plan registered");
        self.plans.insert(
            plan_id.clone(),
            CoordinationPlan {
                id: plan_id,
                primitives: ids,
            },
        );
        Ok(())
    }

    /// Registers one primitive outside any plan.
    ///
    /// # Errors
    /// See [`CoordinationEngine::register`].
    pub fn register_primitive(
        &mut self,
        id: PrimitiveId,
        spec: PrimitiveSpec,
    ) -> Result<(), CoordError> {
        self.engine.register(id, spec)
    }

    /// Removes a plan and all its primitives.
    ///
    /// # Errors
    /// [`CoordError::PlanNotFound`] for unknown plan ids.
    pub fn remove_plan(&mut self, plan_id: &str) -> Result<(), CoordError> {
        let plan = self
            .plans
            .remove(plan_id)
            .ok_or_else(|| CoordError::PlanNotFound(plan_id.to_string()))?;
        for id in &plan.primitives {
            let _ = self.engine.remove(id);
        }
        Ok(())
    }

    pub fn plan(&self, plan_id: &str) -> Option<&CoordinationPlan> {
        self.plans.get(plan_id)
    }

    pub fn plans(&self) -> impl Iterator<Item = &CoordinationPlan> {
        self.plans.values()
    }

    /// Evaluates every primitive at tick `t`, appends the events to the
    /// ring, and feeds them to the hook.
    pub fn evaluate_at(
        &mut self,
        t: Tick,
        anim: &AnimationEngine,
        eval_cond: ConditionEval<'_>,
    ) -> TickOutcome {
        let outcome = self.engine.evaluate_at(t, anim, eval_cond);
        for event in &outcome.events {
            if self.events.len() >= self.event_capacity {
                self.events.pop_front();
            }
            self.events.push_back(event.clone());
            if let Some(hook) = &mut self.hook {
                hook(event);
            }
        }
        outcome
    }

    /// Predicts events over `[t0, t1]` without mutating primitive
    /// state or the event ring. Used only to warm the frame cache.
    pub fn predict(
        &self,
        t0: Tick,
        t1: Tick,
        anim: &AnimationEngine,
        eval_cond: ConditionEval<'_>,
    ) -> Vec<CoordinationEvent> {
        self.engine.predict(t0, t1, anim, eval_cond)
    }

    /// The retained events, oldest first.
    pub fn recent_events(&self) -> impl Iterator<Item = &CoordinationEvent> {
        self.events.iter()
    }

    /// Direct access to the engine for activation and state queries.
    pub fn engine(&self) -> &CoordinationEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut CoordinationEngine {
        &mut self.engine
    }

    /// Per-primitive states for checkpointing.
    pub fn states_snapshot(&self) -> BTreeMap<PrimitiveId, PrimitiveState> {
        self.engine.states_snapshot()
    }

    /// Restores checkpointed states (specs must already be registered).
    pub fn restore_states(
        &mut self,
        states: BTreeMap<PrimitiveId, PrimitiveState>,
    ) {
        self.engine.restore_states(states);
    }
}

impl std::fmt::Debug for Timeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timeline")
            .field("plans", &self.plans.len())
            .field("retained_events", &self.events.len())
            .finish()
    }
}
