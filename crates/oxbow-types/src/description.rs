use serde::{Deserialize, Serialize};

use crate::id::{CollectionId, SchemaVersionId};

/// Metadata describing a collection at one schema version.
///
/// Collections sharing the same `root_id` hold the same logical document set
/// across schema versions; lens transforms migrate documents between adjacent
/// versions on read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionDescription {
    /// Local collection name. Currently mirrors the schema name.
    pub name: Option<String>,
    /// Local identifier, allocated from the `collection` sequence. Immutable.
    pub id: CollectionId,
    /// Root identifier linking collection rows across schema versions.
    pub root_id: CollectionId,
    /// The schema version this collection row is at.
    pub schema_version_id: SchemaVersionId,
    /// Sources this collection draws documents from. Non-empty only for views.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    /// Secondary indexes on this collection.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDescription>,
    /// Policy binding, if the collection is access controlled.
    ///
    /// Must be validated against the ACP module before being persisted, so an
    /// invalid policy id or unknown resource never reaches the store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyDescription>,
}

impl CollectionDescription {
    /// Find an index by name.
    pub fn index_by_name(&self, name: &str) -> Option<&IndexDescription> {
        self.indexes.iter().find(|i| i.name == name)
    }

    /// Indexes covering the given field name (as their first field).
    pub fn indexes_on_field(&self, field_name: &str) -> Vec<&IndexDescription> {
        self.indexes
            .iter()
            .filter(|i| i.fields.first().map(|f| f.name.as_str()) == Some(field_name))
            .collect()
    }
}

/// A secondary index over one or more fields of a collection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub id: u32,
    pub fields: Vec<IndexedFieldDescription>,
    #[serde(default)]
    pub unique: bool,
}

/// One field of a secondary index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexedFieldDescription {
    pub name: String,
    #[serde(default)]
    pub descending: bool,
}

/// Binding of a collection to a policy resource.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyDescription {
    /// The registered policy id (hex content hash).
    pub id: String,
    /// The resource within the policy that documents of this collection map to.
    pub resource: String,
}

/// A data source for a view collection.
///
/// Serialized with an explicit `type` tag so the variant never has to be
/// guessed from field presence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Source {
    Query(QuerySource),
    Collection(CollectionSource),
}

/// A view source materialized by running a stored query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuerySource {
    /// The stored query text, executed against the host collection set.
    pub query: String,
    /// Optional lens applied to each produced document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

/// A view source drawing documents from another collection.
///
/// Holds only the source collection id, never a handle: the collection graph
/// is resolved lazily through the description store, so two collections
/// sourcing each other cannot create an ownership cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionSource {
    pub source_collection_id: CollectionId,
    /// Optional lens applied to each document drawn from the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CollectionDescription {
        CollectionDescription {
            name: Some("Users".to_string()),
            id: CollectionId(1),
            root_id: CollectionId(1),
            schema_version_id: SchemaVersionId("abc123".to_string()),
            sources: vec![Source::Collection(CollectionSource {
                source_collection_id: CollectionId(2),
                transform: None,
            })],
            indexes: vec![IndexDescription {
                name: "Users_Name".to_string(),
                id: 1,
                fields: vec![IndexedFieldDescription {
                    name: "Name".to_string(),
                    descending: false,
                }],
                unique: false,
            }],
            policy: Some(PolicyDescription {
                id: "deadbeef".to_string(),
                resource: "users".to_string(),
            }),
        }
    }

    #[test]
    fn description_json_roundtrip_is_identity() {
        let desc = sample();
        let json = serde_json::to_string(&desc).unwrap();
        let parsed: CollectionDescription = serde_json::from_str(&json).unwrap();
        assert_eq!(desc, parsed);
    }

    #[test]
    fn source_variants_are_tagged() {
        let query = Source::Query(QuerySource {
            query: "Users".to_string(),
            transform: None,
        });
        let json = serde_json::to_string(&query).unwrap();
        assert!(json.contains("\"type\":\"query\""));

        let collection = Source::Collection(CollectionSource {
            source_collection_id: CollectionId(3),
            transform: None,
        });
        let json = serde_json::to_string(&collection).unwrap();
        assert!(json.contains("\"type\":\"collection\""));
    }

    #[test]
    fn indexes_on_field_matches_leading_field_only() {
        let desc = sample();
        assert_eq!(desc.indexes_on_field("Name").len(), 1);
        assert!(desc.indexes_on_field("Age").is_empty());
    }

    #[test]
    fn empty_optionals_are_omitted_from_json() {
        let mut desc = sample();
        desc.sources.clear();
        desc.indexes.clear();
        desc.policy = None;
        let json = serde_json::to_string(&desc).unwrap();
        assert!(!json.contains("sources"));
        assert!(!json.contains("indexes"));
        assert!(!json.contains("policy"));
    }
}
