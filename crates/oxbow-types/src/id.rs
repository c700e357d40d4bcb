use std::fmt;

use cid::Cid;
use serde::{Deserialize, Serialize};

use crate::block_cid::new_cid_raw;
use crate::error::TypeError;

/// The reserved field-id string used for the document-level composite CRDT.
///
/// Per-field keys use the decimal rendering of [`FieldId`]; the composite
/// occupies this marker instead so it sorts alongside the fields of the same
/// document.
pub const COMPOSITE_NAMESPACE: &str = "C";

/// Content-addressed document identifier.
///
/// A `DocId` is the string form of a CIDv1 (raw codec, SHA-256) computed over
/// the document's initial field values and its schema root. The same initial
/// document under the same schema always yields the same id, on every peer.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    /// Derive a document id from the canonical encoding of the initial
    /// document value and the schema root it was created under.
    pub fn generate(initial_value: &[u8], schema_root: &SchemaRoot) -> Self {
        let mut data = Vec::with_capacity(schema_root.as_str().len() + initial_value.len());
        data.extend_from_slice(schema_root.as_str().as_bytes());
        data.extend_from_slice(initial_value);
        Self(new_cid_raw(&data).to_string())
    }

    /// Parse a document id from its string form.
    ///
    /// The input must be a well-formed CID; anything else is rejected.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        if s.is_empty() {
            return Err(TypeError::InvalidDocId("empty".to_string()));
        }
        Cid::try_from(s).map_err(|e| TypeError::InvalidDocId(e.to_string()))?;
        Ok(Self(s.to_string()))
    }

    /// The string form used in storage keys and pubsub topic names.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DocId({})", &self.0)
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Numeric identifier of a schema field, rendered in keys as a decimal string.
///
/// Field ids are append-only: patching a schema may add fields but never
/// renumbers or removes existing ones.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct FieldId(pub u32);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Local numeric identifier of a collection, allocated from the `collection`
/// sequence. Collections sharing a root id span schema versions of the same
/// logical collection.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct CollectionId(pub u32);

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-hash identifier of one schema version. Immutable once computed.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SchemaVersionId(pub String);

impl SchemaVersionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaVersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The version id of the first version of a schema. Shared by all later
/// versions, linking them into one lineage.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct SchemaRoot(pub String);

impl SchemaRoot {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SchemaRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> SchemaRoot {
        SchemaRoot("bafytestroot".to_string())
    }

    #[test]
    fn doc_id_is_deterministic() {
        let a = DocId::generate(b"doc bytes", &root());
        let b = DocId::generate(b"doc bytes", &root());
        assert_eq!(a, b);
    }

    #[test]
    fn doc_id_depends_on_schema_root() {
        let a = DocId::generate(b"doc bytes", &root());
        let b = DocId::generate(b"doc bytes", &SchemaRoot("otherroot".to_string()));
        assert_ne!(a, b);
    }

    #[test]
    fn doc_id_parse_roundtrip() {
        let id = DocId::generate(b"some doc", &root());
        let parsed = DocId::parse(id.as_str()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn doc_id_parse_rejects_empty() {
        assert_eq!(
            DocId::parse(""),
            Err(TypeError::InvalidDocId("empty".to_string()))
        );
    }

    #[test]
    fn doc_id_parse_rejects_garbage() {
        assert!(DocId::parse("not-a-cid").is_err());
    }

    #[test]
    fn field_id_renders_as_decimal() {
        assert_eq!(FieldId(7).to_string(), "7");
    }

    #[test]
    fn composite_marker_is_not_a_decimal_field() {
        // Guards against a field id ever colliding with the composite slot.
        assert!(COMPOSITE_NAMESPACE.parse::<u32>().is_err());
    }
}
