use thiserror::Error;

pub type KeyResult<T> = Result<T, KeyError>;

/// Errors produced when parsing storage keys.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("key is empty")]
    EmptyKey,

    #[error("failed to get field id of key: {0}")]
    FailedToGetFieldId(String),

    #[error("invalid cid in key: {0}")]
    InvalidCid(String),
}
