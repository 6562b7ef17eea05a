//! Embedded persistence for Tickloom.
//!
//! A single SQLite file (WAL mode) holds animation definitions and
//! lifecycle rows, coordination plans, the append-only event and
//! metric history, drained data samples, and periodic engine
//! checkpoints:
//!
//! - **Schema** — versioned via a `meta(schema_version)` row; forward
//!   migrations only.
//! - **Store** ([`Store`]) — synchronous operations, batched
//!   transactions, compare-and-set lifecycle updates, retention sweep.
//! - **Writer** ([`StoreWriter`]) — a dedicated thread fed by a bounded
//!   channel, so the frame loop never waits on disk.
//!
//! Restoring a checkpoint and replaying the persisted events up to a
//! tick reproduces the engine state a from-scratch run reaches — the
//! orchestrator drives that; this crate just stores and serves the
//! pieces faithfully.

mod error;
mod schema;
mod store;
mod writer;

pub use error::StoreError;
pub use schema::SCHEMA_VERSION;
pub use store::{AnimationRow, PlanRow, Store};
pub use writer::{
    EnqueueError, StoreWriter, WriteOp, DEFAULT_QUEUE_CAPACITY,
};
