/// Errors from storage cell and mechanism operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The cell cannot accept new content.
    #[error("cell {cell} is read-only")]
    ReadOnly { cell: String },

    /// The mechanism instance owning this cell has been destroyed.
    #[error("storage mechanism {mechanism} is closed")]
    Closed { mechanism: String },

    /// The mechanism instance has not been initialized yet.
    #[error("storage mechanism {mechanism} is not initialized")]
    NotInitialized { mechanism: String },

    /// Any other failure reported by the backend.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
