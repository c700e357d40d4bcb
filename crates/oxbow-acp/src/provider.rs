use oxbow_types::ActorIdentity;

use crate::error::AcpResult;
use crate::policy::Policy;

/// The permission being checked on a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DocPermission {
    Read,
    Write,
}

impl DocPermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocPermission::Read => "read",
            DocPermission::Write => "write",
        }
    }
}

/// The access control provider interface.
///
/// Contracts shared by all implementations:
///
/// - `add_policy` returns the deterministic policy id (content hash).
/// - `validate_resource_exists_on_valid_dpi` fails with a typed error if the
///   policy is unknown, the resource is not named by it, or the policy is not
///   DPI compliant.
/// - `register_doc_object` binds a document to its owning actor; empty doc or
///   resource arguments are errors.
/// - `is_doc_registered` / `check_doc_access` answer `false` (not an error)
///   for unregistered documents; empty arguments are errors.
/// - After `close`, reopening a persistent provider against the same path
///   yields identical answers for all of the above.
pub trait AcpProvider: Send + Sync {
    /// Register a policy, returning its content-hash id.
    fn add_policy(&self, creator: &ActorIdentity, policy_text: &str) -> AcpResult<String>;

    /// Fetch a registered policy by id.
    fn policy(&self, policy_id: &str) -> AcpResult<Option<Policy>>;

    /// Check that the policy exists, names the resource, and meets the DPI
    /// requirements.
    fn validate_resource_exists_on_valid_dpi(
        &self,
        policy_id: &str,
        resource: &str,
    ) -> AcpResult<()>;

    /// Mark a document as owned by `actor` under `(policy, resource)`.
    fn register_doc_object(
        &self,
        actor: &ActorIdentity,
        policy_id: &str,
        resource: &str,
        doc_id: &str,
    ) -> AcpResult<()>;

    /// Whether the document has been registered.
    fn is_doc_registered(&self, policy_id: &str, resource: &str, doc_id: &str)
        -> AcpResult<bool>;

    /// Whether `actor` holds `permission` on the document.
    fn check_doc_access(
        &self,
        permission: DocPermission,
        actor: &ActorIdentity,
        policy_id: &str,
        resource: &str,
        doc_id: &str,
    ) -> AcpResult<bool>;

    /// Release resources and flush state.
    fn close(&self) -> AcpResult<()>;
}
