//! Data layer for Tickloom: how the outside world reaches the engine.
//!
//! Three pieces, all feeding the per-tick pipeline:
//!
//! - **Ring buffers** ([`RingBuffer`], [`DrainCursor`]) — lock-free
//!   ingest of named samples from producer threads; drained once per
//!   tick by the orchestrator.
//! - **Dependency manager** ([`DependencyManager`]) — the observable /
//!   observer DAG; batches and deduplicates change notifications and
//!   collapses them into at most one snapshot invalidation per tick.
//! - **Bindings** ([`BindingSet`]) — data samples and expressions
//!   mapped onto animation parameters, with a `Direct` route for hot
//!   paths.
//!
//! ```text
//! producers → RingBuffer → drain(tick) → BindingSet → parameter updates
//!                              │
//!                              └→ DependencyManager → dirty set, invalidation
//! ```

mod binding;
mod deps;
mod error;
mod ring;

pub use binding::{BindingRoute, BindingSet, ParameterUpdate};
pub use deps::{
    ChangeEvent, ChangeKind, DependencyManager, DispatchResult, SubscriptionId,
};
pub use error::DataError;
pub use ring::{
    DrainCursor, RingBuffer, Sample, SampleValue, MAX_VALUE_BYTES,
};
