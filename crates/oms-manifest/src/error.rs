//! Error types for offline manifest resolution.

use oms_muxer::MuxerError;
use oms_storage::StorageError;
use oms_types::OfflineUri;
use thiserror::Error;

/// Coarse classification of [`ParserError`]s.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The uri string does not follow the offline uri grammar.
    MalformedOfflineUri,
    /// The uri is well formed but nothing is stored there.
    KeyNotFound,
    /// No storage backend is usable.
    StorageUnavailable,
    /// A storage backend reported a failure.
    Storage,
    /// The operation is not allowed in the parser's current state.
    InvalidState,
}

/// Errors returned by [`OfflineManifestParser`](crate::OfflineManifestParser).
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("malformed offline uri {uri:?}: {reason}")]
    MalformedOfflineUri { uri: String, reason: String },

    #[error("no stored manifest at {uri}: {reason}")]
    KeyNotFound { uri: String, reason: String },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("cannot {operation}: parser is {state}")]
    InvalidState {
        state: &'static str,
        operation: &'static str,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ParserError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ParserError::MalformedOfflineUri { .. } => ErrorKind::MalformedOfflineUri,
            ParserError::KeyNotFound { .. } => ErrorKind::KeyNotFound,
            ParserError::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
            ParserError::InvalidState { .. } => ErrorKind::InvalidState,
            ParserError::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Classify a muxer failure that happened while resolving `uri`.
    pub(crate) fn from_muxer(err: MuxerError, uri: &OfflineUri) -> Self {
        match err {
            MuxerError::MechanismNotFound(_) | MuxerError::CellNotFound { .. } => {
                ParserError::KeyNotFound {
                    uri: uri.to_string(),
                    reason: err.to_string(),
                }
            }
            MuxerError::Storage(e) => ParserError::Storage(e),
            other => ParserError::StorageUnavailable(other.to_string()),
        }
    }
}

/// Convenience alias for parser operations.
pub type ParserResult<T> = Result<T, ParserError>;
