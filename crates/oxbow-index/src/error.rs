use thiserror::Error;

pub type IndexResult<T> = Result<T, IndexError>;

/// Errors produced by the index engine.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] oxbow_store::StoreError),

    #[error(transparent)]
    Key(#[from] oxbow_keys::KeyError),

    #[error("unique index {index} already has an entry for this value")]
    UniqueViolation { index: String },

    #[error("field {field} is not part of the document")]
    MissingField { field: String },

    #[error("invalid index entry encoding: {0}")]
    InvalidEntry(String),

    #[error("document lookup failed: {0}")]
    Fetch(String),
}
