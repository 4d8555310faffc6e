use std::path::PathBuf;

/// Errors from record store operations.
///
/// A missing record is never an error: lookups return `Ok(None)` and
/// update/delete return `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be serialized, or a whole-file document could
    /// not be parsed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The record to append carries no integer `id`.
    #[error("record has no integer id")]
    MissingId,

    /// Page numbers start at 1 and limits must be positive.
    #[error("invalid page request: page {page}, limit {limit}")]
    InvalidPage { page: usize, limit: usize },

    /// The rewritten temp file could not be renamed over the collection.
    /// The original is intact and the temp file is left for the startup
    /// sweep.
    #[error("failed to commit rewrite of {path}: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
