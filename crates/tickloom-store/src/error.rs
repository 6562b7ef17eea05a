//! Error types for the persistence layer.

/// Errors from the embedded store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying SQLite operation failed.
    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    /// The on-disk schema is newer than this build understands.
    /// Forward migrations only — downgrade is not supported.
    #[error("schema version {found} is newer than supported {supported}")]
    SchemaTooNew { found: i64, supported: i64 },

    /// A stored payload failed to parse.
    #[error("corrupt stored payload: {0}")]
    CorruptPayload(#[from] serde_json::Error),

    /// The writer thread is gone; no more writes can be queued.
    #[error("persistence writer has shut down")]
    WriterGone,
}
