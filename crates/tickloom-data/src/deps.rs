//! Dependency manager: who observes what, and what got dirty this tick.
//!
//! Observables (data variables, compiled expressions, widget-visible
//! reactives) and their observers form a directed acyclic graph. Every
//! mutation to a registered observable queues a [`ChangeEvent`];
//! [`DependencyManager::dispatch`] runs once per tick, deduplicates the
//! queue, walks the graph to find dirty observers, and collapses the
//! whole tick's changes into at most one snapshot invalidation.
//!
//! Cycles are rejected when the subscription is made — the dispatch
//! walk never has to defend against them.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};

use tickloom_anim::Tick;

use crate::DataError;

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

/// What kind of mutation happened.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// A data variable received a new sample.
    DataSample,
    /// A derived expression's inputs changed.
    Expression,
    /// An animation parameter was rebound.
    Parameter,
    /// The set of registered animations or primitives changed.
    Structure,
}

/// One mutation to a registered observable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// The observable that changed.
    pub source: String,
    /// Small event-specific payload (new value, count, …).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<serde_json::Value>,
}

/// The result of one per-tick dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchResult {
    pub tick: Tick,
    /// Deduplicated change events, in `(source, kind)` order.
    pub events: Vec<ChangeEvent>,
    /// Every observer reachable from a changed observable.
    pub dirty_observers: BTreeSet<String>,
    /// `true` when any change reached a visible observable. The
    /// orchestrator turns this into a snapshot bump and cache purge.
    /// At most one per tick regardless of how many changes arrived.
    pub snapshot_invalidated: bool,
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Token returned by [`DependencyManager::subscribe`]; used to
/// unsubscribe. Subscriptions are non-owning — dropping the token does
/// nothing, unsubscribing (or tearing down the manager) ends them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone)]
struct Subscription {
    observer: String,
    observable: String,
}

/// Tracks observables, observers, and per-tick change batches.
#[derive(Debug, Default)]
pub struct DependencyManager {
    /// Observable name → whether it is widget-visible.
    observables: BTreeMap<String, bool>,
    /// Observable → observers watching it (edge direction of dispatch).
    watchers: BTreeMap<String, BTreeSet<String>>,
    subscriptions: BTreeMap<u64, Subscription>,
    next_subscription: u64,
    /// Changes queued since the last dispatch, deduplicated on entry
    /// by `(source, kind)` — the first payload of a tick wins.
    pending: BTreeMap<(String, ChangeKind), ChangeEvent>,
}

impl DependencyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an observable. `visible` marks observables whose
    /// changes invalidate pre-computed frames.
    ///
    /// # Errors
    /// [`DataError::DuplicateObservable`] if the name is taken.
    pub fn register_observable(
        &mut self,
        name: impl Into<String>,
        visible: bool,
    ) -> Result<(), DataError> {
        let name = name.into();
        if self.observables.contains_key(&name) {
            return Err(DataError::DuplicateObservable(name));
        }
        self.observables.insert(name, visible);
        Ok(())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.observables.contains_key(name)
    }

    /// Subscribes `observer` to `observable`.
    ///
    /// The observer may itself be a registered observable (a derived
    /// expression observing a variable); in that case the edge is
    /// checked against the existing graph and rejected if it would
    /// close a cycle.
    ///
    /// # Errors
    /// [`DataError::UnknownObservable`] or [`DataError::DependencyCycle`].
    pub fn subscribe(
        &mut self,
        observer: impl Into<String>,
        observable: &str,
    ) -> Result<SubscriptionId, DataError> {
        let observer = observer.into();
        if !self.observables.contains_key(observable) {
            return Err(DataError::UnknownObservable(observable.to_string()));
        }
        // Walking from the proposed observer must not reach the
        // observable, otherwise observable → observer → … → observable
        // would loop.
        if self.reaches(&observer, observable) {
            return Err(DataError::DependencyCycle {
                observer,
                observable: observable.to_string(),
            });
        }

        self.watchers
            .entry(observable.to_string())
            .or_default()
            .insert(observer.clone());
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscriptions.insert(
            id,
            Subscription {
                observer,
                observable: observable.to_string(),
            },
        );
        Ok(SubscriptionId(id))
    }

    /// Removes a subscription. Unknown tokens are ignored (the
    /// subscriber may already have been torn down).
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        if let Some(sub) = self.subscriptions.remove(&id.0) {
            // Only drop the edge if no other subscription keeps it.
            let still_held = self
                .subscriptions
                .values()
                .any(|s| s.observer == sub.observer && s.observable == sub.observable);
            if !still_held {
                if let Some(watchers) = self.watchers.get_mut(&sub.observable) {
                    watchers.remove(&sub.observer);
                }
            }
        }
    }

    /// Queues a change to a registered observable. Unregistered sources
    /// are ignored — producers may be ahead of the binding setup.
    pub fn note_change(&mut self, event: ChangeEvent) {
        if !self.observables.contains_key(&event.source) {
            return;
        }
        self.pending
            .entry((event.source.clone(), event.kind))
            .or_insert(event);
    }

    /// Dispatches the tick's batched changes.
    ///
    /// Called once per tick, after ingest and before coordination.
    /// Clears the pending queue.
    pub fn dispatch(&mut self, tick: Tick) -> DispatchResult {
        let pending = std::mem::take(&mut self.pending);
        let mut dirty = BTreeSet::new();
        let mut invalidated = false;

        for ((source, _), _) in &pending {
            if self.observables.get(source).copied().unwrap_or(false) {
                invalidated = true;
            }
            self.collect_dirty(source, &mut dirty, &mut invalidated);
        }

        let events: Vec<ChangeEvent> = pending.into_values().collect();
        if !events.is_empty() {
            tracing::trace!(
                tick,
                changes = events.len(),
                dirty = dirty.len(),
                invalidated,
                "dependency dispatch"
            );
        }
        DispatchResult {
            tick,
            events,
            dirty_observers: dirty,
            snapshot_invalidated: invalidated,
        }
    }

    /// Breadth-first walk over watchers, marking visible nodes.
    fn collect_dirty(
        &self,
        source: &str,
        dirty: &mut BTreeSet<String>,
        invalidated: &mut bool,
    ) {
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(source);
        while let Some(node) = queue.pop_front() {
            if let Some(watchers) = self.watchers.get(node) {
                for watcher in watchers {
                    if dirty.insert(watcher.clone()) {
                        if self.observables.get(watcher).copied().unwrap_or(false)
                        {
                            *invalidated = true;
                        }
                        queue.push_back(watcher);
                    }
                }
            }
        }
    }

    /// `true` if `to` is reachable from `from` along watcher edges.
    fn reaches(&self, from: &str, to: &str) -> bool {
        if from == to {
            return true;
        }
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<&str> = VecDeque::new();
        queue.push_back(from);
        while let Some(node) = queue.pop_front() {
            if let Some(watchers) = self.watchers.get(node) {
                for watcher in watchers {
                    if watcher == to {
                        return true;
                    }
                    if visited.insert(watcher.as_str()) {
                        queue.push_back(watcher);
                    }
                }
            }
        }
        false
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn change(source: &str, kind: ChangeKind) -> ChangeEvent {
        ChangeEvent {
            kind,
            source: source.to_string(),
            data: None,
        }
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut deps = DependencyManager::new();
        deps.register_observable("cpu", false).unwrap();
        assert!(matches!(
            deps.register_observable("cpu", false),
            Err(DataError::DuplicateObservable(_))
        ));
    }

    #[test]
    fn test_dispatch_dedupes_by_source_and_kind() {
        let mut deps = DependencyManager::new();
        deps.register_observable("cpu", false).unwrap();
        deps.note_change(change("cpu", ChangeKind::DataSample));
        deps.note_change(change("cpu", ChangeKind::DataSample));
        deps.note_change(change("cpu", ChangeKind::Expression));

        let result = deps.dispatch(1);
        assert_eq!(result.events.len(), 2); // one per (source, kind)
        // Dispatch clears the queue.
        assert!(deps.dispatch(2).events.is_empty());
    }

    #[test]
    fn test_dirty_propagates_transitively() {
        let mut deps = DependencyManager::new();
        deps.register_observable("cpu", false).unwrap();
        deps.register_observable("cpu_pct", false).unwrap();
        // cpu_pct derives from cpu; a widget watches cpu_pct.
        deps.subscribe("cpu_pct", "cpu").unwrap();
        deps.subscribe("gauge_widget", "cpu_pct").unwrap();

        deps.note_change(change("cpu", ChangeKind::DataSample));
        let result = deps.dispatch(1);
        assert!(result.dirty_observers.contains("cpu_pct"));
        assert!(result.dirty_observers.contains("gauge_widget"));
    }

    #[test]
    fn test_visible_observable_invalidates_snapshot_once() {
        let mut deps = DependencyManager::new();
        deps.register_observable("cpu", false).unwrap();
        deps.register_observable("gauge", true).unwrap();
        deps.subscribe("gauge", "cpu").unwrap();

        deps.note_change(change("cpu", ChangeKind::DataSample));
        deps.note_change(change("cpu", ChangeKind::Expression));
        let result = deps.dispatch(1);
        assert!(result.snapshot_invalidated);

        // No changes, no invalidation.
        assert!(!deps.dispatch(2).snapshot_invalidated);
    }

    #[test]
    fn test_invisible_chain_does_not_invalidate() {
        let mut deps = DependencyManager::new();
        deps.register_observable("cpu", false).unwrap();
        deps.register_observable("log_sink", false).unwrap();
        deps.subscribe("log_sink", "cpu").unwrap();

        deps.note_change(change("cpu", ChangeKind::DataSample));
        assert!(!deps.dispatch(1).snapshot_invalidated);
    }

    #[test]
    fn test_cycle_is_rejected_at_subscribe() {
        let mut deps = DependencyManager::new();
        deps.register_observable("a", false).unwrap();
        deps.register_observable("b", false).unwrap();
        deps.subscribe("b", "a").unwrap(); // b watches a
        let err = deps.subscribe("a", "b").unwrap_err(); // a watches b → cycle
        assert!(matches!(err, DataError::DependencyCycle { .. }));
        // Self-observation is the degenerate cycle.
        assert!(deps.subscribe("a", "a").is_err());
    }

    #[test]
    fn test_unsubscribe_stops_propagation() {
        let mut deps = DependencyManager::new();
        deps.register_observable("cpu", false).unwrap();
        let sub = deps.subscribe("widget", "cpu").unwrap();

        deps.note_change(change("cpu", ChangeKind::DataSample));
        assert!(deps.dispatch(1).dirty_observers.contains("widget"));

        deps.unsubscribe(sub);
        deps.note_change(change("cpu", ChangeKind::DataSample));
        assert!(deps.dispatch(2).dirty_observers.is_empty());
    }

    #[test]
    fn test_unregistered_source_changes_are_ignored() {
        let mut deps = DependencyManager::new();
        deps.note_change(change("ghost", ChangeKind::DataSample));
        assert!(deps.dispatch(1).events.is_empty());
    }
}
