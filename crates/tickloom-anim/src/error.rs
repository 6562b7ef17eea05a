//! Error types for the animation layer.
//!
//! Only registration and lifecycle operations can fail. Evaluation
//! (`state_at`) cannot — by the time a definition is registered it has
//! passed every check, so the render path never sees a `Result`.

use crate::def::AnimId;

/// Errors that can occur while defining or managing animations.
#[derive(Debug, thiserror::Error)]
pub enum AnimError {
    /// The easing name is not in the closed registry.
    #[error("unknown easing `{0}`")]
    UnknownEasing(String),

    /// The definition failed builder validation.
    #[error("invalid animation definition `{id}`: {reason}")]
    InvalidDefinition { id: AnimId, reason: String },

    /// An animation with this id is already registered.
    #[error("animation `{0}` is already registered")]
    DuplicateId(AnimId),

    /// No animation with this id is registered.
    #[error("animation `{0}` not found")]
    NotFound(AnimId),

    /// The definition names a custom interpolator the engine does not
    /// have. Registered interpolators must exist before the definitions
    /// that use them.
    #[error("animation `{id}` names unknown interpolator `{name}`")]
    UnknownInterpolator { id: AnimId, name: String },

    /// Snapshot serialization failed.
    #[error("snapshot encode failed: {0}")]
    SnapshotEncode(serde_json::Error),

    /// Snapshot bytes were malformed or from an incompatible build.
    #[error("snapshot decode failed: {0}")]
    SnapshotDecode(serde_json::Error),
}
