//! The two local provider implementations: in-memory and persistent.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use oxbow_types::ActorIdentity;

use crate::error::{AcpError, AcpResult};
use crate::policy::Policy;
use crate::provider::{AcpProvider, DocPermission};

const STATE_FILE: &str = "acp_state.json";

/// A policy together with the identity that registered it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct StoredPolicy {
    policy: Policy,
    creator: String,
}

/// The full provider state. Serialized as-is for the persistent backend.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
struct AcpState {
    /// policy id → stored policy.
    policies: BTreeMap<String, StoredPolicy>,
    /// `<policyID>/<resource>/<docID>` → owner identity.
    registrations: BTreeMap<String, String>,
}

impl AcpState {
    fn registration_key(policy_id: &str, resource: &str, doc_id: &str) -> String {
        format!("{policy_id}/{resource}/{doc_id}")
    }

    fn add_policy(
        &mut self,
        creator: &ActorIdentity,
        policy_text: &str,
        reject_duplicates: bool,
    ) -> AcpResult<String> {
        let policy = Policy::parse(policy_text)?;
        let id = policy.id();
        if self.policies.contains_key(&id) {
            if reject_duplicates {
                return Err(AcpError::FailedToAddPolicy(format!(
                    "policy {id} already exists"
                )));
            }
            // Ephemeral backend: adding the same policy again is a no-op
            // returning the same id.
            return Ok(id);
        }
        self.policies.insert(
            id.clone(),
            StoredPolicy {
                policy,
                creator: creator.as_str().to_string(),
            },
        );
        debug!(policy = %id, "policy added");
        Ok(id)
    }

    fn validate_resource(&self, policy_id: &str, resource: &str) -> AcpResult<()> {
        let stored = self
            .policies
            .get(policy_id)
            .ok_or_else(|| AcpError::PolicyDoesNotExist(policy_id.to_string()))?;
        stored.policy.validate_resource_on_dpi(policy_id, resource)
    }

    fn register_doc(
        &mut self,
        actor: &ActorIdentity,
        policy_id: &str,
        resource: &str,
        doc_id: &str,
    ) -> AcpResult<()> {
        if doc_id.is_empty() || resource.is_empty() {
            return Err(AcpError::FailedToRegisterDoc(
                "document id and resource must be non-empty".to_string(),
            ));
        }
        if !self.policies.contains_key(policy_id) {
            return Err(AcpError::FailedToRegisterDoc(format!(
                "policy {policy_id} does not exist"
            )));
        }
        let key = Self::registration_key(policy_id, resource, doc_id);
        // First writer wins: re-registration never reassigns ownership.
        self.registrations
            .entry(key)
            .or_insert_with(|| actor.as_str().to_string());
        Ok(())
    }

    fn is_registered(&self, policy_id: &str, resource: &str, doc_id: &str) -> AcpResult<bool> {
        if doc_id.is_empty() || resource.is_empty() {
            return Err(AcpError::FailedToCheckIfDocIsRegistered(
                "document id and resource must be non-empty".to_string(),
            ));
        }
        Ok(self
            .registrations
            .contains_key(&Self::registration_key(policy_id, resource, doc_id)))
    }

    fn check_access(
        &self,
        permission: DocPermission,
        actor: &ActorIdentity,
        policy_id: &str,
        resource: &str,
        doc_id: &str,
    ) -> AcpResult<bool> {
        if doc_id.is_empty() || resource.is_empty() {
            return Err(AcpError::FailedToVerifyDocAccess(
                "document id and resource must be non-empty".to_string(),
            ));
        }
        let _ = permission;
        let key = Self::registration_key(policy_id, resource, doc_id);
        match self.registrations.get(&key) {
            // Unregistered documents yield false, not an error.
            None => Ok(false),
            // DPI guarantees every protected permission leads with `owner`,
            // so the owning actor holds all of them.
            Some(owner) => Ok(owner == actor.as_str()),
        }
    }
}

/// Ephemeral access control provider. All state is lost on drop, so adding
/// the same policy after a restart succeeds with the same id.
pub struct InMemoryAcp {
    state: RwLock<AcpState>,
}

impl InMemoryAcp {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(AcpState::default()),
        }
    }
}

impl Default for InMemoryAcp {
    fn default() -> Self {
        Self::new()
    }
}

impl AcpProvider for InMemoryAcp {
    fn add_policy(&self, creator: &ActorIdentity, policy_text: &str) -> AcpResult<String> {
        self.state
            .write()
            .expect("lock poisoned")
            .add_policy(creator, policy_text, false)
    }

    fn policy(&self, policy_id: &str) -> AcpResult<Option<Policy>> {
        Ok(self
            .state
            .read()
            .expect("lock poisoned")
            .policies
            .get(policy_id)
            .map(|s| s.policy.clone()))
    }

    fn validate_resource_exists_on_valid_dpi(
        &self,
        policy_id: &str,
        resource: &str,
    ) -> AcpResult<()> {
        self.state
            .read()
            .expect("lock poisoned")
            .validate_resource(policy_id, resource)
    }

    fn register_doc_object(
        &self,
        actor: &ActorIdentity,
        policy_id: &str,
        resource: &str,
        doc_id: &str,
    ) -> AcpResult<()> {
        self.state
            .write()
            .expect("lock poisoned")
            .register_doc(actor, policy_id, resource, doc_id)
    }

    fn is_doc_registered(
        &self,
        policy_id: &str,
        resource: &str,
        doc_id: &str,
    ) -> AcpResult<bool> {
        self.state
            .read()
            .expect("lock poisoned")
            .is_registered(policy_id, resource, doc_id)
    }

    fn check_doc_access(
        &self,
        permission: DocPermission,
        actor: &ActorIdentity,
        policy_id: &str,
        resource: &str,
        doc_id: &str,
    ) -> AcpResult<bool> {
        self.state
            .read()
            .expect("lock poisoned")
            .check_access(permission, actor, policy_id, resource, doc_id)
    }

    fn close(&self) -> AcpResult<()> {
        Ok(())
    }
}

/// Durable access control provider.
///
/// State is serialized to `<path>/acp_state.json` after every mutation and
/// reloaded on open, so policies, registrations, and access decisions are
/// identical across restarts against the same path.
pub struct PersistentAcp {
    state: RwLock<AcpState>,
    path: PathBuf,
}

impl PersistentAcp {
    /// Open (or create) provider state under the given directory.
    pub fn open(path: &Path) -> AcpResult<Self> {
        fs::create_dir_all(path).map_err(|e| AcpError::Persistence(e.to_string()))?;
        let state_file = path.join(STATE_FILE);
        let state = if state_file.exists() {
            let bytes =
                fs::read(&state_file).map_err(|e| AcpError::Persistence(e.to_string()))?;
            serde_json::from_slice(&bytes).map_err(|e| AcpError::Persistence(e.to_string()))?
        } else {
            AcpState::default()
        };
        info!(path = %path.display(), "access control state loaded");
        Ok(Self {
            state: RwLock::new(state),
            path: path.to_path_buf(),
        })
    }

    fn flush(&self, state: &AcpState) -> AcpResult<()> {
        let bytes =
            serde_json::to_vec_pretty(state).map_err(|e| AcpError::Persistence(e.to_string()))?;
        fs::write(self.path.join(STATE_FILE), bytes)
            .map_err(|e| AcpError::Persistence(e.to_string()))
    }
}

impl AcpProvider for PersistentAcp {
    fn add_policy(&self, creator: &ActorIdentity, policy_text: &str) -> AcpResult<String> {
        let mut state = self.state.write().expect("lock poisoned");
        let id = state.add_policy(creator, policy_text, true)?;
        self.flush(&state)?;
        Ok(id)
    }

    fn policy(&self, policy_id: &str) -> AcpResult<Option<Policy>> {
        Ok(self
            .state
            .read()
            .expect("lock poisoned")
            .policies
            .get(policy_id)
            .map(|s| s.policy.clone()))
    }

    fn validate_resource_exists_on_valid_dpi(
        &self,
        policy_id: &str,
        resource: &str,
    ) -> AcpResult<()> {
        self.state
            .read()
            .expect("lock poisoned")
            .validate_resource(policy_id, resource)
    }

    fn register_doc_object(
        &self,
        actor: &ActorIdentity,
        policy_id: &str,
        resource: &str,
        doc_id: &str,
    ) -> AcpResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.register_doc(actor, policy_id, resource, doc_id)?;
        self.flush(&state)
    }

    fn is_doc_registered(
        &self,
        policy_id: &str,
        resource: &str,
        doc_id: &str,
    ) -> AcpResult<bool> {
        self.state
            .read()
            .expect("lock poisoned")
            .is_registered(policy_id, resource, doc_id)
    }

    fn check_doc_access(
        &self,
        permission: DocPermission,
        actor: &ActorIdentity,
        policy_id: &str,
        resource: &str,
        doc_id: &str,
    ) -> AcpResult<bool> {
        self.state
            .read()
            .expect("lock poisoned")
            .check_access(permission, actor, policy_id, resource, doc_id)
    }

    fn close(&self) -> AcpResult<()> {
        let state = self.state.read().expect("lock poisoned");
        self.flush(&state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_POLICY: &str = r#"
description: a policy

actor:
  name: actor

resources:
  users:
    permissions:
      write:
        expr: owner
      read:
        expr: owner + reader

    relations:
      owner:
        types:
          - actor
      reader:
        types:
          - actor
"#;

    fn identity1() -> ActorIdentity {
        ActorIdentity::new("cosmos1zzg43wdrhmmk89z3pmejwete2kkd4a3vn7w969").unwrap()
    }

    fn identity2() -> ActorIdentity {
        ActorIdentity::new("cosmos1x25hhksxhu86r45hqwk28dd70qzux3262hdrll").unwrap()
    }

    // -----------------------------------------------------------------------
    // Policy lifecycle: in-memory vs persistent
    // -----------------------------------------------------------------------

    #[test]
    fn in_memory_add_policy_can_create_twice() {
        let acp = InMemoryAcp::new();
        let id = acp.add_policy(&identity1(), VALID_POLICY).unwrap();
        acp.close().unwrap();

        // Since nothing is persisted, a fresh provider accepts the same
        // policy again and derives the same id.
        let acp = InMemoryAcp::new();
        let id2 = acp.add_policy(&identity1(), VALID_POLICY).unwrap();
        assert_eq!(id, id2);
        acp.close().unwrap();
    }

    #[test]
    fn persistent_add_policy_cannot_create_twice() {
        let dir = tempfile::tempdir().unwrap();
        let acp = PersistentAcp::open(dir.path()).unwrap();
        let id = acp.add_policy(&identity1(), VALID_POLICY).unwrap();
        acp.close().unwrap();
        drop(acp);

        // The policy survives the restart, so a second add is rejected.
        let acp = PersistentAcp::open(dir.path()).unwrap();
        let err = acp.add_policy(&identity1(), VALID_POLICY).unwrap_err();
        assert!(matches!(err, AcpError::FailedToAddPolicy(_)));
        assert!(acp.policy(&id).unwrap().is_some());
        acp.close().unwrap();
    }

    #[test]
    fn ids_agree_across_backends() {
        let memory = InMemoryAcp::new();
        let dir = tempfile::tempdir().unwrap();
        let persistent = PersistentAcp::open(dir.path()).unwrap();
        assert_eq!(
            memory.add_policy(&identity1(), VALID_POLICY).unwrap(),
            persistent.add_policy(&identity1(), VALID_POLICY).unwrap()
        );
    }

    // -----------------------------------------------------------------------
    // Resource validation
    // -----------------------------------------------------------------------

    #[test]
    fn validate_resource_exists_or_typed_errors() {
        let acp = InMemoryAcp::new();
        let id = acp.add_policy(&identity1(), VALID_POLICY).unwrap();

        acp.validate_resource_exists_on_valid_dpi(&id, "users")
            .unwrap();

        let err = acp
            .validate_resource_exists_on_valid_dpi(&id, "resourceDoesNotExist")
            .unwrap_err();
        assert!(matches!(
            err,
            AcpError::ResourceDoesNotExistOnTargetPolicy { .. }
        ));

        let err = acp
            .validate_resource_exists_on_valid_dpi("invalidPolicyID", "resourceDoesNotExist")
            .unwrap_err();
        assert!(matches!(err, AcpError::PolicyDoesNotExist(_)));
    }

    #[test]
    fn persistent_validation_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let acp = PersistentAcp::open(dir.path()).unwrap();
        let id = acp.add_policy(&identity1(), VALID_POLICY).unwrap();
        acp.close().unwrap();
        drop(acp);

        let acp = PersistentAcp::open(dir.path()).unwrap();
        acp.validate_resource_exists_on_valid_dpi(&id, "users")
            .unwrap();
        assert!(acp
            .validate_resource_exists_on_valid_dpi(&id, "resourceDoesNotExist")
            .is_err());
    }

    // -----------------------------------------------------------------------
    // Document registration
    // -----------------------------------------------------------------------

    #[test]
    fn register_and_check_doc() {
        let acp = InMemoryAcp::new();
        let id = acp.add_policy(&identity1(), VALID_POLICY).unwrap();

        // Empty doc and resource cannot be registered.
        let err = acp
            .register_doc_object(&identity1(), &id, "", "")
            .unwrap_err();
        assert!(matches!(err, AcpError::FailedToRegisterDoc(_)));

        // Empty arguments cannot be queried either.
        let err = acp.is_doc_registered(&id, "", "").unwrap_err();
        assert!(matches!(err, AcpError::FailedToCheckIfDocIsRegistered(_)));

        // Nothing registered yet.
        assert!(!acp.is_doc_registered(&id, "users", "documentID_XYZ").unwrap());

        acp.register_doc_object(&identity1(), &id, "users", "documentID_XYZ")
            .unwrap();
        assert!(acp.is_doc_registered(&id, "users", "documentID_XYZ").unwrap());
    }

    #[test]
    fn registration_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let acp = PersistentAcp::open(dir.path()).unwrap();
        let id = acp.add_policy(&identity1(), VALID_POLICY).unwrap();
        acp.register_doc_object(&identity1(), &id, "users", "documentID_XYZ")
            .unwrap();
        acp.close().unwrap();
        drop(acp);

        let acp = PersistentAcp::open(dir.path()).unwrap();
        assert!(acp.is_doc_registered(&id, "users", "documentID_XYZ").unwrap());
    }

    // -----------------------------------------------------------------------
    // Access checks
    // -----------------------------------------------------------------------

    #[test]
    fn check_doc_access_owner_only() {
        let acp = InMemoryAcp::new();
        let id = acp.add_policy(&identity1(), VALID_POLICY).unwrap();

        // Empty arguments are an error.
        let err = acp
            .check_doc_access(DocPermission::Read, &identity1(), &id, "", "")
            .unwrap_err();
        assert!(matches!(err, AcpError::FailedToVerifyDocAccess(_)));

        // Unregistered document: false without error.
        assert!(!acp
            .check_doc_access(DocPermission::Read, &identity1(), &id, "users", "documentID_XYZ")
            .unwrap());

        acp.register_doc_object(&identity1(), &id, "users", "documentID_XYZ")
            .unwrap();

        assert!(acp
            .check_doc_access(DocPermission::Read, &identity1(), &id, "users", "documentID_XYZ")
            .unwrap());
        assert!(!acp
            .check_doc_access(DocPermission::Read, &identity2(), &id, "users", "documentID_XYZ")
            .unwrap());
    }

    #[test]
    fn access_decisions_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let acp = PersistentAcp::open(dir.path()).unwrap();
        let id = acp.add_policy(&identity1(), VALID_POLICY).unwrap();
        acp.register_doc_object(&identity1(), &id, "users", "documentID_XYZ")
            .unwrap();
        acp.close().unwrap();
        drop(acp);

        let acp = PersistentAcp::open(dir.path()).unwrap();
        assert!(acp
            .check_doc_access(DocPermission::Read, &identity1(), &id, "users", "documentID_XYZ")
            .unwrap());
        assert!(!acp
            .check_doc_access(DocPermission::Write, &identity2(), &id, "users", "documentID_XYZ")
            .unwrap());
    }

    #[test]
    fn first_registration_wins() {
        let acp = InMemoryAcp::new();
        let id = acp.add_policy(&identity1(), VALID_POLICY).unwrap();
        acp.register_doc_object(&identity1(), &id, "users", "doc1")
            .unwrap();
        // A second registration by another actor does not steal ownership.
        acp.register_doc_object(&identity2(), &id, "users", "doc1")
            .unwrap();
        assert!(acp
            .check_doc_access(DocPermission::Write, &identity1(), &id, "users", "doc1")
            .unwrap());
        assert!(!acp
            .check_doc_access(DocPermission::Write, &identity2(), &id, "users", "doc1")
            .unwrap());
    }
}
