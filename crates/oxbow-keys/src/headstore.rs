use cid::Cid;
use oxbow_types::DocId;

use crate::error::{KeyError, KeyResult};
use crate::prefix::bytes_prefix_end;
use crate::Key;

/// A key into the head store:
///
/// `/[DocID]/[FieldID]/[CID]`
///
/// The field id component is the decimal field id, or `"C"` for the
/// document-level composite. The value stored under a head key is the head's
/// priority as an unsigned varint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct HeadStoreKey {
    pub doc_id: String,
    pub field_id: String,
    pub cid: Option<Cid>,
}

impl HeadStoreKey {
    pub fn new(doc_id: &DocId, field_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.as_str().to_string(),
            field_id: field_id.into(),
            cid: None,
        }
    }

    /// Parse from the canonical string form. All three components are
    /// required and the CID must decode.
    pub fn parse(key: &str) -> KeyResult<Self> {
        if key.is_empty() {
            return Err(KeyError::EmptyKey);
        }
        let elements: Vec<&str> = key.split('/').collect();
        // elements[0] is empty (keys have a leading '/').
        if elements.len() != 4 || !elements[0].is_empty() {
            return Err(KeyError::InvalidKey(key.to_string()));
        }
        let cid = Cid::try_from(elements[3]).map_err(|e| KeyError::InvalidCid(e.to_string()))?;
        Ok(Self {
            doc_id: elements[1].to_string(),
            field_id: elements[2].to_string(),
            cid: Some(cid),
        })
    }

    pub fn with_cid(mut self, cid: Cid) -> Self {
        self.cid = Some(cid);
        self
    }

    pub fn with_field_id(mut self, field_id: impl Into<String>) -> Self {
        self.field_id = field_id.into();
        self
    }

    /// The smallest key strictly greater than every key with this prefix.
    pub fn prefix_end(&self) -> Vec<u8> {
        bytes_prefix_end(&self.to_bytes())
    }
}

impl Key for HeadStoreKey {
    fn to_key_string(&self) -> String {
        let mut result = String::new();
        if !self.doc_id.is_empty() {
            result.push('/');
            result.push_str(&self.doc_id);
        }
        if !self.field_id.is_empty() {
            result.push('/');
            result.push_str(&self.field_id);
        }
        if let Some(cid) = &self.cid {
            result.push('/');
            result.push_str(&cid.to_string());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_types::{new_cid_dagpb, SchemaRoot, COMPOSITE_NAMESPACE};

    fn doc() -> DocId {
        DocId::generate(b"head key tests", &SchemaRoot("r".to_string()))
    }

    #[test]
    fn roundtrip_with_cid() {
        let key = HeadStoreKey::new(&doc(), "3").with_cid(new_cid_dagpb(b"block"));
        let parsed = HeadStoreKey::parse(&key.to_key_string()).unwrap();
        assert_eq!(key, parsed);
    }

    #[test]
    fn composite_field_component() {
        let key = HeadStoreKey::new(&doc(), COMPOSITE_NAMESPACE).with_cid(new_cid_dagpb(b"c"));
        assert!(key.to_key_string().contains("/C/"));
    }

    #[test]
    fn parse_rejects_missing_cid() {
        let key = HeadStoreKey::new(&doc(), "1");
        assert!(HeadStoreKey::parse(&key.to_key_string()).is_err());
    }

    #[test]
    fn parse_rejects_bad_cid() {
        let s = format!("/{}/1/not-a-cid", doc().as_str());
        assert!(matches!(
            HeadStoreKey::parse(&s),
            Err(KeyError::InvalidCid(_))
        ));
    }

    #[test]
    fn parse_rejects_empty() {
        assert_eq!(HeadStoreKey::parse(""), Err(KeyError::EmptyKey));
    }

    #[test]
    fn prefix_end_bounds_head_scan() {
        let prefix = HeadStoreKey::new(&doc(), "1");
        let end = prefix.prefix_end();
        let full = HeadStoreKey::new(&doc(), "1").with_cid(new_cid_dagpb(b"x"));
        assert!(full.to_bytes() < end);
        assert!(prefix.to_bytes() < end);
    }
}
