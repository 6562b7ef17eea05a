//! Unified error type for the Tickloom engine.

use tickloom_anim::AnimError;
use tickloom_coord::CoordError;
use tickloom_data::DataError;
use tickloom_expr::ExprError;
use tickloom_marquee::MarqueeError;
use tickloom_store::StoreError;

/// Top-level error that wraps all crate-specific errors.
///
/// Applications using the `tickloom` meta-crate deal with this single
/// type; the `#[from]` variants let `?` convert sub-crate errors
/// automatically. Only registration-time operations surface these —
/// render-path failures are metrics, not errors.
#[derive(Debug, thiserror::Error)]
pub enum TickloomError {
    /// An animation-layer error (validation, lifecycle, snapshot).
    #[error(transparent)]
    Anim(#[from] AnimError),

    /// An expression-layer error (compile, eval, budget).
    #[error(transparent)]
    Expr(#[from] ExprError),

    /// A coordination-layer error (primitive registration, plans).
    #[error(transparent)]
    Coord(#[from] CoordError),

    /// A marquee-layer error (program validation, unknown widget).
    #[error(transparent)]
    Marquee(#[from] MarqueeError),

    /// A data-layer error (buffers, bindings, dependency graph).
    #[error(transparent)]
    Data(#[from] DataError),

    /// A persistence-layer error (open, migrate).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The engine hit a fatal invariant violation and quiesced: it
    /// keeps serving the last good frame and refuses registrations.
    #[error("engine is quiesced; new registrations are refused")]
    Quiesced,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickloom_anim::AnimId;

    #[test]
    fn test_from_anim_error() {
        let err: TickloomError = AnimError::DuplicateId(AnimId::new("a")).into();
        assert!(matches!(err, TickloomError::Anim(_)));
        assert!(err.to_string().contains("already registered"));
    }

    #[test]
    fn test_from_expr_error() {
        let err: TickloomError =
            tickloom_expr::compile("1 +", &[]).unwrap_err().into();
        assert!(matches!(err, TickloomError::Expr(_)));
    }

    #[test]
    fn test_from_marquee_error() {
        use tickloom_marquee::WidgetId;
        let err: TickloomError =
            MarqueeError::UnknownWidget(WidgetId::new("w")).into();
        assert!(matches!(err, TickloomError::Marquee(_)));
    }
}
