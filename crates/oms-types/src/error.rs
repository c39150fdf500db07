//! Error types for identifier and URI handling.

use thiserror::Error;

/// Errors produced while constructing or parsing core types.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TypeError {
    /// The string is not a well-formed offline URI.
    #[error("malformed offline uri {uri:?}: {reason}")]
    MalformedUri { uri: String, reason: String },

    /// A mechanism or cell identifier failed validation.
    #[error("invalid {what} id {id:?}: {reason}")]
    InvalidId {
        what: &'static str,
        id: String,
        reason: String,
    },
}

/// Convenience type alias for type-level operations.
pub type Result<T> = std::result::Result<T, TypeError>;
