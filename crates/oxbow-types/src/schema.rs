use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::id::{FieldId, SchemaRoot, SchemaVersionId};

/// The primitive kind of a schema field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Bool,
    Int,
    Float,
    String,
    Bytes,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldKind::Bool => "bool",
            FieldKind::Int => "int",
            FieldKind::Float => "float",
            FieldKind::String => "string",
            FieldKind::Bytes => "bytes",
        };
        f.write_str(s)
    }
}

/// Description of a single schema field.
///
/// Fields are append-only: a schema patch may add fields but never removes or
/// renumbers existing ones, and a field's kind never changes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FieldDescription {
    pub name: String,
    pub id: FieldId,
    pub kind: FieldKind,
    /// Whether the field admits null values.
    #[serde(default)]
    pub nillable: bool,
}

/// A schema: a named, ordered set of fields at one version.
///
/// `version_id` is a content hash of the schema contents; `root` equals the
/// `version_id` of the first version and links all versions of the schema
/// into one lineage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub name: String,
    pub root: SchemaRoot,
    pub version_id: SchemaVersionId,
    pub fields: Vec<FieldDescription>,
}

/// The hashed portion of a schema: everything except the derived ids.
#[derive(Serialize)]
struct SchemaContents<'a> {
    name: &'a str,
    fields: &'a [FieldDescription],
}

impl SchemaDescription {
    /// Build the first version of a schema. The root is set to the computed
    /// version id.
    pub fn new(name: impl Into<String>, fields: Vec<FieldDescription>) -> Self {
        let name = name.into();
        let version_id = compute_version_id(&name, &fields);
        Self {
            name,
            root: SchemaRoot(version_id.0.clone()),
            version_id,
            fields,
        }
    }

    /// Build a successor version with the given fields, keeping the root.
    pub fn next_version(&self, fields: Vec<FieldDescription>) -> Self {
        let version_id = compute_version_id(&self.name, &fields);
        Self {
            name: self.name.clone(),
            root: self.root.clone(),
            version_id,
            fields,
        }
    }

    /// Look up a field by name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescription> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a field by id.
    pub fn field_by_id(&self, id: FieldId) -> Option<&FieldDescription> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// The next unused field id.
    pub fn next_field_id(&self) -> FieldId {
        FieldId(self.fields.iter().map(|f| f.id.0 + 1).max().unwrap_or(1))
    }
}

/// Compute a schema version id: the SHA-256 hex digest of the canonical JSON
/// of the schema contents. Stable across processes and peers.
pub fn compute_version_id(name: &str, fields: &[FieldDescription]) -> SchemaVersionId {
    let contents = SchemaContents { name, fields };
    // Field order is part of the schema, so plain serialization is canonical.
    let json = serde_json::to_vec(&contents).expect("schema contents always serialize");
    let digest = Sha256::digest(&json);
    SchemaVersionId(hex::encode(digest))
}
