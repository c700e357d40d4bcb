use std::collections::BTreeMap;

use cid::Cid;
use oxbow_types::{DocId, SchemaRoot};
use prost::Message;

use crate::error::{CrdtError, CrdtResult};
use crate::pb;

/// Document status carried by composite deltas.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocStatus {
    Active,
    Deleted,
}

impl DocStatus {
    fn to_wire(self) -> u32 {
        match self {
            DocStatus::Active => 1,
            DocStatus::Deleted => 2,
        }
    }

    fn from_wire(v: u32) -> CrdtResult<Self> {
        match v {
            1 => Ok(DocStatus::Active),
            2 => Ok(DocStatus::Deleted),
            other => Err(CrdtError::MalformedDelta(format!(
                "unknown document status {other}"
            ))),
        }
    }
}

/// A last-writer-wins register delta for a single field.
#[derive(Clone, Debug, PartialEq)]
pub struct LwwRegDelta {
    pub priority: u64,
    pub doc_id: DocId,
    /// Decimal field id string.
    pub field_id: String,
    /// DAG-CBOR encoded field value.
    pub data: Vec<u8>,
    pub schema_root: SchemaRoot,
}

/// A composite delta representing one logical document update event.
///
/// `sub_deltas` maps each touched field id to the CID of the field-level
/// delta covered by this update, linking the composite into the field DAGs.
#[derive(Clone, Debug, PartialEq)]
pub struct CompositeDelta {
    pub priority: u64,
    pub doc_id: DocId,
    pub status: DocStatus,
    pub sub_deltas: BTreeMap<String, Cid>,
    pub schema_root: SchemaRoot,
}

/// The payload of a single CRDT write.
#[derive(Clone, Debug, PartialEq)]
pub enum Delta {
    LwwRegister(LwwRegDelta),
    Composite(CompositeDelta),
}

impl Delta {
    pub fn priority(&self) -> u64 {
        match self {
            Delta::LwwRegister(d) => d.priority,
            Delta::Composite(d) => d.priority,
        }
    }

    pub fn set_priority(&mut self, priority: u64) {
        match self {
            Delta::LwwRegister(d) => d.priority = priority,
            Delta::Composite(d) => d.priority = priority,
        }
    }

    pub fn doc_id(&self) -> &DocId {
        match self {
            Delta::LwwRegister(d) => &d.doc_id,
            Delta::Composite(d) => &d.doc_id,
        }
    }

    pub fn schema_root(&self) -> &SchemaRoot {
        match self {
            Delta::LwwRegister(d) => &d.schema_root,
            Delta::Composite(d) => &d.schema_root,
        }
    }

    /// The head-store field component this delta advances: the decimal field
    /// id for registers, the composite marker otherwise.
    pub fn field_component(&self) -> &str {
        match self {
            Delta::LwwRegister(d) => &d.field_id,
            Delta::Composite(_) => oxbow_types::COMPOSITE_NAMESPACE,
        }
    }

    /// Encode to the wire representation.
    pub fn encode(&self) -> Vec<u8> {
        let wire = match self {
            Delta::LwwRegister(d) => pb::Delta {
                priority: d.priority,
                kind: pb::DeltaKind::LwwRegister as i32,
                doc_id: d.doc_id.as_str().to_string(),
                field_id: d.field_id.clone(),
                data: d.data.clone(),
                status: 0,
                sub_deltas: Default::default(),
                schema_root: d.schema_root.as_str().to_string(),
            },
            Delta::Composite(d) => pb::Delta {
                priority: d.priority,
                kind: pb::DeltaKind::Composite as i32,
                doc_id: d.doc_id.as_str().to_string(),
                field_id: String::new(),
                data: Vec::new(),
                status: d.status.to_wire(),
                sub_deltas: d
                    .sub_deltas
                    .iter()
                    .map(|(field, cid)| (field.clone(), cid.to_bytes()))
                    .collect(),
                schema_root: d.schema_root.as_str().to_string(),
            },
        };
        wire.encode_to_vec()
    }

    /// Decode from the wire representation. Total: every failure is a typed
    /// [`CrdtError::MalformedDelta`].
    pub fn decode(bytes: &[u8]) -> CrdtResult<Self> {
        let wire = pb::Delta::decode(bytes)
            .map_err(|e| CrdtError::MalformedDelta(e.to_string()))?;
        if wire.priority == 0 {
            return Err(CrdtError::MalformedDelta("priority is zero".to_string()));
        }
        let doc_id = DocId::parse(&wire.doc_id)
            .map_err(|e| CrdtError::MalformedDelta(e.to_string()))?;
        let schema_root = SchemaRoot(wire.schema_root);

        match pb::DeltaKind::try_from(wire.kind) {
            Ok(pb::DeltaKind::LwwRegister) => {
                if wire.field_id.is_empty() {
                    return Err(CrdtError::MalformedDelta(
                        "register delta without field id".to_string(),
                    ));
                }
                Ok(Delta::LwwRegister(LwwRegDelta {
                    priority: wire.priority,
                    doc_id,
                    field_id: wire.field_id,
                    data: wire.data,
                    schema_root,
                }))
            }
            Ok(pb::DeltaKind::Composite) => {
                let mut sub_deltas = BTreeMap::new();
                for (field, cid_bytes) in wire.sub_deltas {
                    let cid = Cid::try_from(cid_bytes.as_slice())
                        .map_err(|e| CrdtError::MalformedDelta(e.to_string()))?;
                    sub_deltas.insert(field, cid);
                }
                Ok(Delta::Composite(CompositeDelta {
                    priority: wire.priority,
                    doc_id,
                    status: DocStatus::from_wire(wire.status)?,
                    sub_deltas,
                    schema_root,
                }))
            }
            _ => Err(CrdtError::MalformedDelta(format!(
                "unknown delta kind {}",
                wire.kind
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_types::new_cid_raw;

    fn doc() -> DocId {
        DocId::generate(b"delta tests", &root())
    }

    fn root() -> SchemaRoot {
        SchemaRoot("testroot".to_string())
    }

    #[test]
    fn register_roundtrip() {
        let delta = Delta::LwwRegister(LwwRegDelta {
            priority: 3,
            doc_id: doc(),
            field_id: "2".to_string(),
            data: vec![0x01, 0x02],
            schema_root: root(),
        });
        let decoded = Delta::decode(&delta.encode()).unwrap();
        assert_eq!(decoded, delta);
    }

    #[test]
    fn composite_roundtrip() {
        let mut sub_deltas = BTreeMap::new();
        sub_deltas.insert("1".to_string(), new_cid_raw(b"field1"));
        sub_deltas.insert("2".to_string(), new_cid_raw(b"field2"));
        let delta = Delta::Composite(CompositeDelta {
            priority: 1,
            doc_id: doc(),
            status: DocStatus::Active,
            sub_deltas,
            schema_root: root(),
        });
        let decoded = Delta::decode(&delta.encode()).unwrap();
        assert_eq!(decoded, delta);
    }

    #[test]
    fn zero_priority_is_malformed() {
        let delta = Delta::LwwRegister(LwwRegDelta {
            priority: 0,
            doc_id: doc(),
            field_id: "1".to_string(),
            data: vec![],
            schema_root: root(),
        });
        assert!(matches!(
            Delta::decode(&delta.encode()),
            Err(CrdtError::MalformedDelta(_))
        ));
    }

    #[test]
    fn garbage_is_malformed_not_a_panic() {
        assert!(matches!(
            Delta::decode(&[0xff; 16]),
            Err(CrdtError::MalformedDelta(_))
        ));
    }

    #[test]
    fn field_component_distinguishes_composite() {
        let register = Delta::LwwRegister(LwwRegDelta {
            priority: 1,
            doc_id: doc(),
            field_id: "4".to_string(),
            data: vec![],
            schema_root: root(),
        });
        assert_eq!(register.field_component(), "4");

        let composite = Delta::Composite(CompositeDelta {
            priority: 1,
            doc_id: doc(),
            status: DocStatus::Active,
            sub_deltas: BTreeMap::new(),
            schema_root: root(),
        });
        assert_eq!(composite.field_component(), "C");
    }
}
