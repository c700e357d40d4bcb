use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid document id: {0}")]
    InvalidDocId(String),

    #[error("invalid field value encoding: {0}")]
    InvalidValue(String),

    #[error("field value does not match field kind {expected}")]
    KindMismatch { expected: String },

    #[error("empty actor identity")]
    EmptyIdentity,

    #[error("serialization error: {0}")]
    Serialization(String),
}
