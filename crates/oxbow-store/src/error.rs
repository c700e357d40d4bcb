use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors produced by store operations.
///
/// [`StoreError::Conflict`] is the only retryable variant: the database
/// retries implicit transactions on it. Everything else surfaces to the
/// caller and aborts the enclosing transaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("transaction conflict")]
    Conflict,

    #[error("transaction is discarded")]
    TxnDiscarded,

    #[error("transaction is read only")]
    ReadOnlyTxn,

    #[error("sequence value is corrupt: {0}")]
    CorruptSequence(String),

    #[error("store i/o failure: {0}")]
    Io(String),
}

impl StoreError {
    /// Returns `true` if the operation may succeed when retried on a fresh
    /// transaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict)
    }
}
