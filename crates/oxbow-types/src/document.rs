use std::collections::BTreeMap;

use libipld::cbor::DagCborCodec;
use libipld::prelude::Codec;
use libipld::Ipld;

use crate::error::TypeError;
use crate::id::{DocId, SchemaRoot};
use crate::value::FieldValue;

/// A materialized document: its id plus decoded field values by field name.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub doc_id: DocId,
    pub fields: BTreeMap<String, FieldValue>,
    pub deleted: bool,
}

impl Document {
    pub fn new(doc_id: DocId) -> Self {
        Self {
            doc_id,
            fields: BTreeMap::new(),
            deleted: false,
        }
    }

    pub fn get(&self, field_name: &str) -> Option<&FieldValue> {
        self.fields.get(field_name)
    }

    pub fn set(&mut self, field_name: impl Into<String>, value: FieldValue) {
        self.fields.insert(field_name.into(), value);
    }

    /// The canonical DAG-CBOR encoding of a field map: a map keyed by field
    /// name in lexicographic order. Used to derive document ids, so it must
    /// be identical on every peer for the same logical content.
    pub fn canonical_cbor(fields: &BTreeMap<String, FieldValue>) -> Result<Vec<u8>, TypeError> {
        let map: BTreeMap<String, Ipld> = fields
            .iter()
            .map(|(name, value)| {
                let ipld = match value {
                    FieldValue::Null => Ipld::Null,
                    FieldValue::Bool(b) => Ipld::Bool(*b),
                    FieldValue::Int(i) => Ipld::Integer(*i as i128),
                    FieldValue::Float(f) => Ipld::Float(*f),
                    FieldValue::String(s) => Ipld::String(s.clone()),
                    FieldValue::Bytes(b) => Ipld::Bytes(b.clone()),
                };
                (name.clone(), ipld)
            })
            .collect();
        DagCborCodec
            .encode(&Ipld::StringMap(map))
            .map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Derive the content-addressed id for a new document with the given
    /// initial fields under the given schema root.
    pub fn generate_id(
        fields: &BTreeMap<String, FieldValue>,
        schema_root: &SchemaRoot,
    ) -> Result<DocId, TypeError> {
        let bytes = Self::canonical_cbor(fields)?;
        Ok(DocId::generate(&bytes, schema_root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn id_generation_is_deterministic() {
        let root = SchemaRoot("r".to_string());
        let f = fields(&[
            ("Name", FieldValue::String("John".to_string())),
            ("Age", FieldValue::Int(21)),
        ]);
        let a = Document::generate_id(&f, &root).unwrap();
        let b = Document::generate_id(&f, &root).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn id_depends_on_field_values() {
        let root = SchemaRoot("r".to_string());
        let a = Document::generate_id(
            &fields(&[("Age", FieldValue::Int(21))]),
            &root,
        )
        .unwrap();
        let b = Document::generate_id(
            &fields(&[("Age", FieldValue::Int(22))]),
            &root,
        )
        .unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn canonical_cbor_is_order_independent() {
        // BTreeMap keys are sorted, so insertion order cannot leak into the
        // encoding; this guards the invariant.
        let mut left = BTreeMap::new();
        left.insert("b".to_string(), FieldValue::Int(2));
        left.insert("a".to_string(), FieldValue::Int(1));
        let mut right = BTreeMap::new();
        right.insert("a".to_string(), FieldValue::Int(1));
        right.insert("b".to_string(), FieldValue::Int(2));
        assert_eq!(
            Document::canonical_cbor(&left).unwrap(),
            Document::canonical_cbor(&right).unwrap()
        );
    }
}
