//! Error types for the expression layer.
//!
//! Compile errors carry a byte position into the source so tooling can
//! point at the offending token. Runtime errors are deliberately coarse:
//! on the render path they are converted to type-appropriate zeros at
//! the call site, so their job is diagnostics, not control flow.

/// Errors from compiling or evaluating an expression.
#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    /// The source failed to compile. `position` is a byte offset into
    /// the source text.
    #[error("compile error at byte {position}: {message}")]
    Compile { position: usize, message: String },

    /// Evaluation hit a type or domain problem (e.g. adding a bool).
    #[error("eval error: {0}")]
    Eval(String),

    /// The per-evaluation step budget ran out. The expression was
    /// aborted without producing a value.
    #[error("evaluation budget exhausted")]
    BudgetExhausted,

    /// A variable bound at evaluation time was missing.
    ///
    /// This means the caller's bindings don't match the variables the
    /// expression was compiled against.
    #[error("missing binding for variable `{0}`")]
    MissingBinding(String),
}

impl ExprError {
    pub(crate) fn compile(position: usize, message: impl Into<String>) -> Self {
        Self::Compile {
            position,
            message: message.into(),
        }
    }
}
