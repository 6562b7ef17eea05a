//! Error types for the coordination layer.

use crate::event::PrimitiveId;

/// Errors from registering or managing coordination primitives.
///
/// Evaluation itself never fails — a primitive that is registered can
/// always be evaluated, and data-trigger condition failures degrade to
/// `false` at the evaluator.
#[derive(Debug, thiserror::Error)]
pub enum CoordError {
    /// A primitive with this id is already registered.
    #[error("primitive `{0}` is already registered")]
    DuplicateId(PrimitiveId),

    /// No primitive with this id is registered.
    #[error("primitive `{0}` not found")]
    NotFound(PrimitiveId),

    /// The primitive failed validation (empty waiting set, threshold
    /// outside `[0, 1]`, sequence with no steps, …).
    #[error("invalid primitive `{id}`: {reason}")]
    InvalidPrimitive { id: PrimitiveId, reason: String },

    /// No plan with this id is registered.
    #[error("plan `{0}` not found")]
    PlanNotFound(String),
}
