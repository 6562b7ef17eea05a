//! Error types and diagnostics for the marquee layer.

use crate::program::WidgetId;

/// Errors from registering or resolving marquee programs.
#[derive(Debug, thiserror::Error)]
pub enum MarqueeError {
    /// The program failed structural validation.
    #[error("invalid marquee program for `{widget}`: {reason}")]
    InvalidProgram { widget: WidgetId, reason: String },

    /// No program registered for this widget.
    #[error("unknown marquee widget `{0}`")]
    UnknownWidget(WidgetId),
}

/// Non-fatal resolver diagnostics.
///
/// The resolver always produces a usable timeline; these report the
/// compromises it had to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarqueeDiagnostic {
    /// The fixed-point iteration budget ran out before cross-widget
    /// event ticks stabilized. The listed events were resolved to their
    /// timeout expiry instead.
    NotConverged {
        iterations: u32,
        unresolved_events: Vec<String>,
    },
}
