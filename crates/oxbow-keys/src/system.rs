//! Keys of the system store: collection metadata, schemas, sequences, and
//! the peer subsystem.

use oxbow_types::{CollectionId, SchemaRoot, SchemaVersionId};

use crate::error::{KeyError, KeyResult};
use crate::Key;

pub(crate) const COLLECTION_ID: &str = "/collection/id";
pub(crate) const COLLECTION_NAME: &str = "/collection/name";
pub(crate) const COLLECTION_SCHEMA_VERSION: &str = "/collection/version";
pub(crate) const COLLECTION_INDEX: &str = "/collection/index";
pub(crate) const COLLECTION_POLICY: &str = "/collection/policy";
pub(crate) const SCHEMA_VERSION: &str = "/schema/version/v";
pub(crate) const SCHEMA_VERSION_ROOT: &str = "/schema/version/r";
pub(crate) const SEQ: &str = "/seq";
pub(crate) const REPLICATOR: &str = "/replicator/id";
pub(crate) const P2P_COLLECTION: &str = "/p2p/collection";

/// `/collection/id/<id>` → serialized CollectionDescription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CollectionKey {
    pub collection_id: CollectionId,
}

impl CollectionKey {
    pub fn new(collection_id: CollectionId) -> Self {
        Self { collection_id }
    }

    pub fn parse(key: &str) -> KeyResult<Self> {
        let rest = strip(key, COLLECTION_ID)?;
        let id: u32 = rest
            .parse()
            .map_err(|_| KeyError::InvalidKey(key.to_string()))?;
        Ok(Self::new(CollectionId(id)))
    }
}

impl Key for CollectionKey {
    fn to_key_string(&self) -> String {
        format!("{COLLECTION_ID}/{}", self.collection_id)
    }
}

/// `/collection/name/<name>` → collection id.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionNameKey {
    pub name: String,
}

impl CollectionNameKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn parse(key: &str) -> KeyResult<Self> {
        let rest = strip(key, COLLECTION_NAME)?;
        if rest.is_empty() || rest.contains('/') {
            return Err(KeyError::InvalidKey(key.to_string()));
        }
        Ok(Self::new(rest))
    }
}

impl Key for CollectionNameKey {
    fn to_key_string(&self) -> String {
        format!("{COLLECTION_NAME}/{}", self.name)
    }
}

/// `/collection/version/<schemaVersionID>/<collectionID>` → ∅.
///
/// A secondary index from schema version to the collections using (or having
/// used) it; superseded rows are preserved.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionSchemaVersionKey {
    pub schema_version_id: SchemaVersionId,
    pub collection_id: Option<CollectionId>,
}

impl CollectionSchemaVersionKey {
    pub fn new(schema_version_id: SchemaVersionId, collection_id: CollectionId) -> Self {
        Self {
            schema_version_id,
            collection_id: Some(collection_id),
        }
    }

    /// A prefix key covering every collection on the given version.
    pub fn prefix(schema_version_id: SchemaVersionId) -> Self {
        Self {
            schema_version_id,
            collection_id: None,
        }
    }

    pub fn parse(key: &str) -> KeyResult<Self> {
        let rest = strip(key, COLLECTION_SCHEMA_VERSION)?;
        let elements: Vec<&str> = rest.split('/').collect();
        if elements.len() != 2 {
            return Err(KeyError::InvalidKey(key.to_string()));
        }
        let id: u32 = elements[1]
            .parse()
            .map_err(|_| KeyError::InvalidKey(key.to_string()))?;
        Ok(Self::new(
            SchemaVersionId(elements[0].to_string()),
            CollectionId(id),
        ))
    }
}

impl Key for CollectionSchemaVersionKey {
    fn to_key_string(&self) -> String {
        let mut result = format!("{COLLECTION_SCHEMA_VERSION}/{}", self.schema_version_id);
        if let Some(id) = self.collection_id {
            result.push('/');
            result.push_str(&id.to_string());
        }
        result
    }
}

/// `/collection/index/<collectionID>/<indexName>` → IndexDescription.
///
/// The index name may be omitted to form a prefix over all indexes of the
/// collection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CollectionIndexKey {
    pub collection_id: Option<CollectionId>,
    pub index_name: String,
}

impl CollectionIndexKey {
    pub fn new(collection_id: Option<CollectionId>, index_name: impl Into<String>) -> Self {
        Self {
            collection_id,
            index_name: index_name.into(),
        }
    }

    pub fn parse(key: &str) -> KeyResult<Self> {
        let rest = strip(key, COLLECTION_INDEX)?;
        let elements: Vec<&str> = rest.split('/').collect();
        if elements.is_empty() || elements.len() > 2 {
            return Err(KeyError::InvalidKey(key.to_string()));
        }
        let id: u32 = elements[0]
            .parse()
            .map_err(|_| KeyError::InvalidKey(key.to_string()))?;
        Ok(Self {
            collection_id: Some(CollectionId(id)),
            index_name: elements.get(1).unwrap_or(&"").to_string(),
        })
    }
}

impl Key for CollectionIndexKey {
    fn to_key_string(&self) -> String {
        // If the collection id is empty the rest is ignored.
        let mut result = COLLECTION_INDEX.to_string();
        if let Some(id) = self.collection_id {
            result.push('/');
            result.push_str(&id.to_string());
            if !self.index_name.is_empty() {
                result.push('/');
                result.push_str(&self.index_name);
            }
        }
        result
    }
}

/// `/collection/policy/<collectionID>` → policy binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CollectionPolicyKey {
    pub collection_id: CollectionId,
}

impl CollectionPolicyKey {
    pub fn new(collection_id: CollectionId) -> Self {
        Self { collection_id }
    }

    pub fn parse(key: &str) -> KeyResult<Self> {
        let rest = strip(key, COLLECTION_POLICY)?;
        let id: u32 = rest
            .parse()
            .map_err(|_| KeyError::InvalidKey(key.to_string()))?;
        Ok(Self::new(CollectionId(id)))
    }
}

impl Key for CollectionPolicyKey {
    fn to_key_string(&self) -> String {
        format!("{COLLECTION_POLICY}/{}", self.collection_id)
    }
}

/// `/schema/version/v/<versionID>` → schema content. Immutable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SchemaVersionKey {
    pub schema_version_id: SchemaVersionId,
}

impl SchemaVersionKey {
    pub fn new(schema_version_id: SchemaVersionId) -> Self {
        Self { schema_version_id }
    }

    pub fn parse(key: &str) -> KeyResult<Self> {
        let rest = strip(key, SCHEMA_VERSION)?;
        if rest.is_empty() || rest.contains('/') {
            return Err(KeyError::InvalidKey(key.to_string()));
        }
        Ok(Self::new(SchemaVersionId(rest.to_string())))
    }
}

impl Key for SchemaVersionKey {
    fn to_key_string(&self) -> String {
        format!("{SCHEMA_VERSION}/{}", self.schema_version_id)
    }
}

/// `/schema/version/r/<schemaRoot>/<versionID>` → ∅.
///
/// The index is the key; no value is stored against it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SchemaRootKey {
    pub schema_root: SchemaRoot,
    pub schema_version_id: Option<SchemaVersionId>,
}

impl SchemaRootKey {
    pub fn new(schema_root: SchemaRoot, schema_version_id: SchemaVersionId) -> Self {
        Self {
            schema_root,
            schema_version_id: Some(schema_version_id),
        }
    }

    /// A prefix key covering every version of the given root.
    pub fn prefix(schema_root: SchemaRoot) -> Self {
        Self {
            schema_root,
            schema_version_id: None,
        }
    }

    pub fn parse(key: &str) -> KeyResult<Self> {
        let rest = strip(key, SCHEMA_VERSION_ROOT)?;
        let elements: Vec<&str> = rest.split('/').collect();
        if elements.len() != 2 {
            return Err(KeyError::InvalidKey(key.to_string()));
        }
        Ok(Self::new(
            SchemaRoot(elements[0].to_string()),
            SchemaVersionId(elements[1].to_string()),
        ))
    }
}

impl Key for SchemaRootKey {
    fn to_key_string(&self) -> String {
        let mut result = format!("{SCHEMA_VERSION_ROOT}/{}", self.schema_root);
        if let Some(version) = &self.schema_version_id {
            result.push('/');
            result.push_str(version.as_str());
        }
        result
    }
}

/// `/seq/<name>` → monotonic counter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SequenceKey {
    pub sequence_name: String,
}

impl SequenceKey {
    pub fn new(sequence_name: impl Into<String>) -> Self {
        Self {
            sequence_name: sequence_name.into(),
        }
    }

    pub fn parse(key: &str) -> KeyResult<Self> {
        let rest = strip(key, SEQ)?;
        if rest.is_empty() || rest.contains('/') {
            return Err(KeyError::InvalidKey(key.to_string()));
        }
        Ok(Self::new(rest))
    }
}

impl Key for SequenceKey {
    fn to_key_string(&self) -> String {
        format!("{SEQ}/{}", self.sequence_name)
    }
}

/// `/replicator/id/<id>` → serialized replicator record.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ReplicatorKey {
    pub replicator_id: String,
}

impl ReplicatorKey {
    pub fn new(replicator_id: impl Into<String>) -> Self {
        Self {
            replicator_id: replicator_id.into(),
        }
    }

    pub fn parse(key: &str) -> KeyResult<Self> {
        let rest = strip(key, REPLICATOR)?;
        if rest.is_empty() || rest.contains('/') {
            return Err(KeyError::InvalidKey(key.to_string()));
        }
        Ok(Self::new(rest))
    }
}

impl Key for ReplicatorKey {
    fn to_key_string(&self) -> String {
        format!("{REPLICATOR}/{}", self.replicator_id)
    }
}

/// `/p2p/collection/<collectionID>` → ∅ (collection-topic registration).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct P2pCollectionKey {
    pub collection_id: String,
}

impl P2pCollectionKey {
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
        }
    }

    pub fn parse(key: &str) -> KeyResult<Self> {
        let elements: Vec<&str> = key.split('/').collect();
        if elements.len() != 4 {
            return Err(KeyError::InvalidKey(key.to_string()));
        }
        Ok(Self::new(elements[3]))
    }
}

impl Key for P2pCollectionKey {
    fn to_key_string(&self) -> String {
        format!("{P2P_COLLECTION}/{}", self.collection_id)
    }
}

fn strip<'a>(key: &'a str, namespace: &str) -> KeyResult<&'a str> {
    if key.is_empty() {
        return Err(KeyError::EmptyKey);
    }
    key.strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix('/'))
        .ok_or_else(|| KeyError::InvalidKey(key.to_string()))
}
