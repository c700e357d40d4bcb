use thiserror::Error;

pub type AcpResult<T> = Result<T, AcpError>;

/// Errors produced by the access control module.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AcpError {
    #[error("failed to add policy: {0}")]
    FailedToAddPolicy(String),

    #[error("policy does not exist: {0}")]
    PolicyDoesNotExist(String),

    #[error("resource {resource:?} does not exist on target policy {policy_id}")]
    ResourceDoesNotExistOnTargetPolicy {
        resource: String,
        policy_id: String,
    },

    #[error(
        "policy is not DPI compliant: expr of required permission must start with \
         required relation (permission: {permission}, relation: {relation})"
    )]
    DpiNonCompliant {
        permission: String,
        relation: String,
    },

    #[error("failed to register document: {0}")]
    FailedToRegisterDoc(String),

    #[error("failed to check if document is registered: {0}")]
    FailedToCheckIfDocIsRegistered(String),

    #[error("failed to verify document access: {0}")]
    FailedToVerifyDocAccess(String),

    #[error("failed to persist access control state: {0}")]
    Persistence(String),
}
