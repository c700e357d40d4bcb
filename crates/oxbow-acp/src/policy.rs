//! Policy model, parsing, content addressing, and DPI validation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AcpError, AcpResult};

/// The permissions every usable policy must protect, and the relation their
/// expressions must lead with.
pub const REQUIRED_PERMISSIONS: &[&str] = &["read", "write"];
pub const OWNER_RELATION: &str = "owner";

/// A parsed access control policy.
///
/// Maps are ordered so the canonical JSON (and therefore the policy id) is
/// independent of the declaration order in the source text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
    pub description: String,
    pub actor: ActorType,
    pub resources: BTreeMap<String, PolicyResource>,
}

/// The actor type a policy grants relations to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActorType {
    pub name: String,
}

/// One protected resource: its permissions and relations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyResource {
    pub permissions: BTreeMap<String, PermissionExpr>,
    pub relations: BTreeMap<String, Relation>,
}

/// A permission expression: a sum of relations, e.g. `owner + reader`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PermissionExpr {
    pub expr: String,
}

/// A relation and the actor types it may bind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Relation {
    pub types: Vec<String>,
}

impl Policy {
    /// Parse a policy from YAML or JSON text.
    ///
    /// YAML is a superset of JSON here, so a single parser covers both
    /// accepted encodings. Missing required keys are rejected.
    pub fn parse(text: &str) -> AcpResult<Self> {
        let policy: Policy = serde_yaml::from_str(text)
            .map_err(|e| AcpError::FailedToAddPolicy(format!("invalid policy: {e}")))?;
        if policy.actor.name.is_empty() {
            return Err(AcpError::FailedToAddPolicy(
                "actor name is empty".to_string(),
            ));
        }
        if policy.resources.is_empty() {
            return Err(AcpError::FailedToAddPolicy(
                "policy names no resources".to_string(),
            ));
        }
        Ok(policy)
    }

    /// The policy id: the SHA-256 hex digest of the canonical JSON
    /// serialization. Identical policies produce identical ids on every node.
    pub fn id(&self) -> String {
        let canonical = serde_json::to_vec(self).expect("policy always serializes");
        hex::encode(Sha256::digest(&canonical))
    }

    pub fn resource(&self, name: &str) -> Option<&PolicyResource> {
        self.resources.get(name)
    }

    /// Validate that `resource` exists and meets the DPI requirements:
    /// every protected permission's expression is a sum of relations that
    /// starts with the `owner` relation (no token may precede it), and the
    /// `owner` relation includes the actor type.
    pub fn validate_resource_on_dpi(&self, policy_id: &str, resource: &str) -> AcpResult<()> {
        let res = self.resource(resource).ok_or_else(|| {
            AcpError::ResourceDoesNotExistOnTargetPolicy {
                resource: resource.to_string(),
                policy_id: policy_id.to_string(),
            }
        })?;

        for &permission in REQUIRED_PERMISSIONS {
            let expr = res
                .permissions
                .get(permission)
                .map(|p| p.expr.as_str())
                .unwrap_or("");
            if !expr_leads_with(expr, OWNER_RELATION) {
                return Err(AcpError::DpiNonCompliant {
                    permission: permission.to_string(),
                    relation: OWNER_RELATION.to_string(),
                });
            }
        }

        let owner = res.relations.get(OWNER_RELATION).ok_or_else(|| {
            AcpError::DpiNonCompliant {
                permission: "owner relation missing".to_string(),
                relation: OWNER_RELATION.to_string(),
            }
        })?;
        if !owner.types.iter().any(|t| t == &self.actor.name) {
            return Err(AcpError::DpiNonCompliant {
                permission: format!("owner relation must include actor type {}", self.actor.name),
                relation: OWNER_RELATION.to_string(),
            });
        }

        Ok(())
    }
}

/// Returns `true` if `expr` starts with `relation` as a whole token at
/// position zero: no preceding characters of any kind, and the token is not a
/// prefix of a longer identifier.
fn expr_leads_with(expr: &str, relation: &str) -> bool {
    let Some(rest) = expr.strip_prefix(relation) else {
        return false;
    };
    match rest.chars().next() {
        None => true,
        Some(c) => !c.is_alphanumeric() && c != '_',
    }
}
