use thiserror::Error;

/// Closed error kinds for the storage engine.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key not found: {key}")]
    NotFound { key: String },

    #[error("storage engine error: {0}")]
    Engine(#[from] rocksdb::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StorageError {
    /// Whether this is the missing-key case rather than an engine failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
