use thiserror::Error;

pub type QueryResult<T> = Result<T, QueryError>;

/// Errors produced by query planning and execution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error(transparent)]
    Index(#[from] oxbow_index::IndexError),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("collection scan failed: {0}")]
    Scan(String),
}
