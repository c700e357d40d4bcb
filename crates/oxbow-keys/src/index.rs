use oxbow_types::CollectionId;

use crate::error::{KeyError, KeyResult};
use crate::prefix::bytes_prefix_end;
use crate::Key;

/// A key of an indexed document:
///
/// `/[CollectionID]/[IndexID]/[FieldValue](/[FieldValue]...)`
///
/// For non-unique indexes the document id is appended as the final field
/// value segment; unique indexes store it in the entry value instead.
/// Field values are the order-preserving byte encodings produced by the
/// index engine; a missing value truncates the key at that point.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct IndexDataStoreKey {
    pub collection_id: CollectionId,
    pub index_id: u32,
    pub field_values: Vec<Vec<u8>>,
}

impl IndexDataStoreKey {
    pub fn new(collection_id: CollectionId, index_id: u32, field_values: Vec<Vec<u8>>) -> Self {
        Self {
            collection_id,
            index_id,
            field_values,
        }
    }

    /// Parse from the canonical string form. Requires at least one field
    /// value segment.
    pub fn parse(key: &str) -> KeyResult<Self> {
        if key.is_empty() {
            return Err(KeyError::EmptyKey);
        }
        let Some(rest) = key.strip_prefix('/') else {
            return Err(KeyError::InvalidKey(key.to_string()));
        };
        let elements: Vec<&str> = rest.split('/').collect();
        if elements.len() < 3 {
            return Err(KeyError::InvalidKey(key.to_string()));
        }

        let collection_id: u32 = elements[0]
            .parse()
            .map_err(|_| KeyError::InvalidKey(key.to_string()))?;
        let index_id: u32 = elements[1]
            .parse()
            .map_err(|_| KeyError::InvalidKey(key.to_string()))?;

        let field_values = elements[2..]
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();

        Ok(Self {
            collection_id: CollectionId(collection_id),
            index_id,
            field_values,
        })
    }

    /// The smallest key strictly greater than every key with this prefix.
    pub fn prefix_end(&self) -> Vec<u8> {
        bytes_prefix_end(&self.to_bytes())
    }
}

impl Key for IndexDataStoreKey {
    fn to_key_string(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }

    // Field values are order-preserving byte encodings and need not be valid
    // UTF-8, so the byte form is built directly rather than via the string.
    fn to_bytes(&self) -> Vec<u8> {
        // Built left to right; the first empty component ends the key.
        if self.collection_id.0 == 0 {
            return Vec::new();
        }
        let mut result = format!("/{}", self.collection_id).into_bytes();

        if self.index_id == 0 {
            return result;
        }
        result.push(b'/');
        result.extend_from_slice(self.index_id.to_string().as_bytes());

        for value in &self.field_values {
            if value.is_empty() {
                break;
            }
            result.push(b'/');
            result.extend_from_slice(value);
        }

        result
    }
}
