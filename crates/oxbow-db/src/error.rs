use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

/// Errors produced by database operations.
///
/// Store conflicts are retryable and absorbed by the implicit-transaction
/// retry loop; everything else surfaces to the caller. Access denials are
/// reported as [`DbError::DocumentNotFound`] on reads (existence must not
/// leak) and [`DbError::PermissionDenied`] on writes.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Store(#[from] oxbow_store::StoreError),

    #[error(transparent)]
    Crdt(#[from] oxbow_crdt::CrdtError),

    #[error(transparent)]
    Key(#[from] oxbow_keys::KeyError),

    #[error(transparent)]
    Acp(#[from] oxbow_acp::AcpError),

    #[error(transparent)]
    Index(#[from] oxbow_index::IndexError),

    #[error(transparent)]
    Query(#[from] oxbow_query::QueryError),

    #[error(transparent)]
    Type(#[from] oxbow_types::TypeError),

    #[error("schema type {0} already exists")]
    SchemaTypeAlreadyExists(String),

    #[error("schema id is empty")]
    SchemaIdEmpty,

    #[error("policy id on schema is empty")]
    PolicyIdEmpty,

    #[error("schema carries a policy but access control is not configured")]
    AcpNotConfigured,

    #[error("policy resource on schema is empty")]
    PolicyResourceEmpty,

    #[error("invalid schema definition: {0}")]
    InvalidSchemaDefinition(String),

    #[error("failed to unmarshal collection description: {0}")]
    UnmarshalCollection(String),

    #[error("collection {0} not found")]
    CollectionNotFound(String),

    #[error("schema version {0} not found")]
    SchemaVersionNotFound(String),

    #[error("document not found")]
    DocumentNotFound,

    #[error("document already exists")]
    DocumentAlreadyExists,

    #[error("document is deleted")]
    DocumentDeleted,

    #[error("field {0} is not described by the schema")]
    FieldNotFound(String),

    #[error("value for field {field} does not match kind {kind}")]
    FieldKindMismatch { field: String, kind: String },

    #[error("operation requires an actor identity")]
    MissingIdentity,

    #[error("actor does not have permission on this document")]
    PermissionDenied,

    #[error("invalid schema patch: {0}")]
    InvalidPatch(String),

    #[error("transaction retries exhausted after {0} attempts")]
    RetriesExhausted(usize),
}

impl DbError {
    /// Retryable errors trigger another attempt for implicit transactions.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Store(e) if e.is_retryable())
    }
}
