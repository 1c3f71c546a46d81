use std::path::PathBuf;

/// Errors raised by audit sinks.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Storage engine failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Could not prepare the storage location.
    #[error("failed to prepare audit store at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A previous writer panicked while holding the store.
    #[error("audit store lock poisoned")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, AuditError>;
