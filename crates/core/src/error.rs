//! Serialization error model.

use thiserror::Error;

/// Result type used by bindings and key handling.
pub type CodecResult<T> = Result<T, CodecError>;

/// A per-call failure to convert between domain values and store strings.
///
/// These are local to one job: they never imply anything about the store
/// connection or about other records.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// An identifier token could not be produced or parsed.
    #[error("invalid job identifier: {0}")]
    InvalidId(String),

    /// A token contains a character the store reserves for keys or patterns.
    #[error("job token {token:?} contains reserved character {ch:?}")]
    ReservedCharacter { token: String, ch: char },

    /// A store key does not belong to the expected namespace.
    #[error("key {key:?} is outside namespace {namespace:?}")]
    ForeignKey { key: String, namespace: String },

    /// A payload could not be encoded or decoded.
    #[error("invalid job payload: {0}")]
    Payload(String),
}

impl CodecError {
    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn payload(msg: impl Into<String>) -> Self {
        Self::Payload(msg.into())
    }
}
