use thiserror::Error;

pub type CrdtResult<T> = Result<T, CrdtError>;

/// Errors produced by CRDT operations.
///
/// Store errors abort the enclosing transaction and are safe to retry;
/// malformed deltas are permanent and the offending block is dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrdtError {
    #[error(transparent)]
    Store(#[from] oxbow_store::StoreError),

    #[error(transparent)]
    Key(#[from] oxbow_keys::KeyError),

    #[error("malformed delta: {0}")]
    MalformedDelta(String),

    #[error("invalid cid bytes: {0}")]
    InvalidCid(String),
}
