//! Error types for the data layer.

/// Errors from ring buffers, bindings, and the dependency manager.
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// A sample value exceeded its size cap (64 bytes for text/blob).
    #[error("sample value for `{name}` is {size} bytes; cap is {cap}")]
    ValueTooLarge {
        name: String,
        size: usize,
        cap: usize,
    },

    /// No ring buffer registered under this id.
    #[error("unknown buffer `{0}`")]
    UnknownBuffer(String),

    /// An observable with this name is already registered.
    #[error("observable `{0}` is already registered")]
    DuplicateObservable(String),

    /// No observable registered under this name.
    #[error("unknown observable `{0}`")]
    UnknownObservable(String),

    /// The subscription would close a cycle in the dependency graph.
    /// Cycles are rejected at registration, never discovered later.
    #[error("subscribing `{observer}` to `{observable}` would create a cycle")]
    DependencyCycle {
        observer: String,
        observable: String,
    },

    /// The binding's mapping expression failed to compile.
    #[error("binding for `{animation}`.{parameter}: {source}")]
    BadMapping {
        animation: String,
        parameter: String,
        #[source]
        source: tickloom_expr::ExprError,
    },
}
