use oms_storage::StorageError;
use oms_types::{CellId, MechanismId};
use thiserror::Error;

/// Errors from storage muxer operations.
#[derive(Debug, Error)]
pub enum MuxerError {
    /// The operation needs `init()` to have completed first.
    #[error("storage muxer is not initialized")]
    NotInitialized,

    /// `init()` was called on a muxer that is already initialized.
    #[error("storage muxer is already initialized")]
    AlreadyInitialized,

    /// The muxer has been destroyed and cannot be used again.
    #[error("storage muxer has been destroyed")]
    Destroyed,

    /// No usable mechanism or cell is available.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// No live mechanism with this id.
    #[error("storage mechanism not found: {0}")]
    MechanismNotFound(MechanismId),

    /// The mechanism is live but has no cell with this id.
    #[error("storage cell not found: {mechanism}/{cell}")]
    CellNotFound { mechanism: MechanismId, cell: CellId },

    /// Invalid muxer configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Error reported by a storage mechanism or cell.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result alias for muxer operations.
pub type MuxerResult<T> = Result<T, MuxerError>;
