use std::fmt;

use oxbow_types::{CollectionId, DocId};

use crate::error::{KeyError, KeyResult};
use crate::prefix::bytes_prefix_end;
use crate::Key;

/// The instance type of a data store entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InstanceType {
    /// A field value.
    Value,
    /// A field priority (with the winning delta's CID).
    Priority,
    /// A document tombstone.
    Deleted,
}

impl InstanceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceType::Value => "v",
            InstanceType::Priority => "p",
            InstanceType::Deleted => "d",
        }
    }

    pub fn parse(s: &str) -> KeyResult<Self> {
        match s {
            "v" => Ok(InstanceType::Value),
            "p" => Ok(InstanceType::Priority),
            "d" => Ok(InstanceType::Deleted),
            other => Err(KeyError::InvalidKey(format!(
                "unknown instance type {other:?}"
            ))),
        }
    }
}

impl fmt::Display for InstanceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key into the data store:
///
/// `/[CollectionRootID]/[InstanceType]/[DocID][/FieldID]`
///
/// Partially-populated keys are valid and encode as the prefix of their
/// populated components, which makes them usable as range-scan bounds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct DataStoreKey {
    pub collection_root_id: Option<CollectionId>,
    pub instance_type: Option<InstanceType>,
    pub doc_id: Option<String>,
    pub field_id: Option<String>,
}

impl DataStoreKey {
    pub fn new(root: CollectionId) -> Self {
        Self {
            collection_root_id: Some(root),
            ..Default::default()
        }
    }

    /// Parse from the canonical string form. Requires the root id, instance
    /// type and doc id; the field id is optional.
    pub fn parse(key: &str) -> KeyResult<Self> {
        if key.is_empty() {
            return Err(KeyError::EmptyKey);
        }
        let elements: Vec<&str> = key.trim_start_matches('/').split('/').collect();
        if elements.len() < 3 || elements.len() > 4 {
            return Err(KeyError::InvalidKey(key.to_string()));
        }

        let root: u32 = elements[0]
            .parse()
            .map_err(|_| KeyError::InvalidKey(key.to_string()))?;
        let instance_type = InstanceType::parse(elements[1])?;

        Ok(Self {
            collection_root_id: Some(CollectionId(root)),
            instance_type: Some(instance_type),
            doc_id: Some(elements[2].to_string()),
            field_id: elements.get(3).map(|s| s.to_string()),
        })
    }

    pub fn with_value_flag(mut self) -> Self {
        self.instance_type = Some(InstanceType::Value);
        self
    }

    pub fn with_priority_flag(mut self) -> Self {
        self.instance_type = Some(InstanceType::Priority);
        self
    }

    pub fn with_deleted_flag(mut self) -> Self {
        self.instance_type = Some(InstanceType::Deleted);
        self
    }

    pub fn with_doc_id(mut self, doc_id: &DocId) -> Self {
        self.doc_id = Some(doc_id.as_str().to_string());
        self
    }

    pub fn with_field_id(mut self, field_id: impl Into<String>) -> Self {
        self.field_id = Some(field_id.into());
        self
    }

    /// The numeric field id, when the field component is a decimal field and
    /// not the composite marker.
    pub fn field_id_number(&self) -> KeyResult<u32> {
        let field = self
            .field_id
            .as_deref()
            .ok_or_else(|| KeyError::FailedToGetFieldId("missing field component".to_string()))?;
        field
            .parse()
            .map_err(|e: std::num::ParseIntError| KeyError::FailedToGetFieldId(e.to_string()))
    }

    /// The head store key addressing the same `(docID, fieldID)` pair.
    pub fn to_head_store_key(&self) -> crate::headstore::HeadStoreKey {
        crate::headstore::HeadStoreKey {
            doc_id: self.doc_id.clone().unwrap_or_default(),
            field_id: self.field_id.clone().unwrap_or_default(),
            cid: None,
        }
    }

    /// The primary key addressing the same document.
    pub fn to_primary_key(&self) -> PrimaryDataStoreKey {
        PrimaryDataStoreKey {
            collection_root_id: self.collection_root_id.unwrap_or_default(),
            doc_id: self.doc_id.clone().unwrap_or_default(),
        }
    }

    /// The smallest key strictly greater than every key with this prefix.
    ///
    /// Increments the last populated component; the all-0xff case returns the
    /// component unchanged, meaning "no end".
    pub fn prefix_end(&self) -> Self {
        let mut end = self.clone();
        if let Some(field) = &self.field_id {
            end.field_id = Some(string_prefix_end(field));
            return end;
        }
        if let Some(doc) = &self.doc_id {
            end.doc_id = Some(string_prefix_end(doc));
            return end;
        }
        if let Some(instance) = self.instance_type {
            // The bumped instance byte falls outside the v/p/d alphabet, so
            // it is carried in the doc slot: "/<root>/<bumped>" sorts exactly
            // where the range must end. The result is a scan bound, not a
            // parseable key.
            end.instance_type = None;
            end.field_id = None;
            end.doc_id = Some(string_prefix_end(instance.as_str()));
            return end;
        }
        if let Some(root) = self.collection_root_id {
            end.collection_root_id = Some(CollectionId(root.0 + 1));
            return end;
        }
        end
    }
}

impl Key for DataStoreKey {
    fn to_key_string(&self) -> String {
        let mut result = String::new();
        if let Some(root) = self.collection_root_id {
            result.push('/');
            result.push_str(&root.to_string());
        }
        if let Some(instance) = self.instance_type {
            result.push('/');
            result.push_str(instance.as_str());
        }
        if let Some(doc) = &self.doc_id {
            result.push('/');
            result.push_str(doc);
        }
        if let Some(field) = &self.field_id {
            result.push('/');
            result.push_str(field);
        }
        result
    }
}

/// A key into the primary document index:
///
/// `/[CollectionRootID]/pk/[DocID]`
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct PrimaryDataStoreKey {
    pub collection_root_id: CollectionId,
    pub doc_id: String,
}

impl PrimaryDataStoreKey {
    pub fn new(root: CollectionId, doc_id: &DocId) -> Self {
        Self {
            collection_root_id: root,
            doc_id: doc_id.as_str().to_string(),
        }
    }

    pub fn parse(key: &str) -> KeyResult<Self> {
        if key.is_empty() {
            return Err(KeyError::EmptyKey);
        }
        let elements: Vec<&str> = key.trim_start_matches('/').split('/').collect();
        if elements.len() != 3 || elements[1] != "pk" {
            return Err(KeyError::InvalidKey(key.to_string()));
        }
        let root: u32 = elements[0]
            .parse()
            .map_err(|_| KeyError::InvalidKey(key.to_string()))?;
        Ok(Self {
            collection_root_id: CollectionId(root),
            doc_id: elements[2].to_string(),
        })
    }
}

impl Key for PrimaryDataStoreKey {
    fn to_key_string(&self) -> String {
        let mut result = format!("/{}", self.collection_root_id);
        result.push_str("/pk");
        if !self.doc_id.is_empty() {
            result.push('/');
            result.push_str(&self.doc_id);
        }
        result
    }
}

fn string_prefix_end(s: &str) -> String {
    String::from_utf8_lossy(&bytes_prefix_end(s.as_bytes())).into_owned()
}
