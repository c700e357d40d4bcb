use std::cmp::Ordering;

use libipld::cbor::DagCborCodec;
use libipld::prelude::Codec;
use libipld::Ipld;

use crate::error::TypeError;
use crate::schema::FieldKind;

/// A typed document field value.
///
/// Values are persisted in the data store as DAG-CBOR and travel inside delta
/// blocks in the same encoding, so every peer derives identical bytes (and
/// identical CIDs) for the same logical value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Encode to DAG-CBOR bytes.
    pub fn to_cbor(&self) -> Result<Vec<u8>, TypeError> {
        DagCborCodec
            .encode(&self.to_ipld())
            .map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// Decode from DAG-CBOR bytes.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, TypeError> {
        let ipld: Ipld = DagCborCodec
            .decode(bytes)
            .map_err(|e| TypeError::InvalidValue(e.to_string()))?;
        Self::from_ipld(ipld)
    }

    fn to_ipld(&self) -> Ipld {
        match self {
            FieldValue::Null => Ipld::Null,
            FieldValue::Bool(b) => Ipld::Bool(*b),
            FieldValue::Int(i) => Ipld::Integer(*i as i128),
            FieldValue::Float(f) => Ipld::Float(*f),
            FieldValue::String(s) => Ipld::String(s.clone()),
            FieldValue::Bytes(b) => Ipld::Bytes(b.clone()),
        }
    }

    fn from_ipld(ipld: Ipld) -> Result<Self, TypeError> {
        match ipld {
            Ipld::Null => Ok(FieldValue::Null),
            Ipld::Bool(b) => Ok(FieldValue::Bool(b)),
            Ipld::Integer(i) => {
                let i = i64::try_from(i)
                    .map_err(|_| TypeError::InvalidValue("integer out of range".to_string()))?;
                Ok(FieldValue::Int(i))
            }
            Ipld::Float(f) => Ok(FieldValue::Float(f)),
            Ipld::String(s) => Ok(FieldValue::String(s)),
            Ipld::Bytes(b) => Ok(FieldValue::Bytes(b)),
            other => Err(TypeError::InvalidValue(format!(
                "unsupported value shape: {other:?}"
            ))),
        }
    }

    /// Build a value from JSON input, checked against the field kind.
    ///
    /// JSON integers are accepted for float fields (widened); everything else
    /// must match the kind exactly. `null` is accepted only for nillable
    /// fields, which the caller checks.
    pub fn from_json(value: &serde_json::Value, kind: FieldKind) -> Result<Self, TypeError> {
        let mismatch = || TypeError::KindMismatch {
            expected: kind.to_string(),
        };
        match (value, kind) {
            (serde_json::Value::Null, _) => Ok(FieldValue::Null),
            (serde_json::Value::Bool(b), FieldKind::Bool) => Ok(FieldValue::Bool(*b)),
            (serde_json::Value::Number(n), FieldKind::Int) => {
                n.as_i64().map(FieldValue::Int).ok_or_else(mismatch)
            }
            (serde_json::Value::Number(n), FieldKind::Float) => {
                n.as_f64().map(FieldValue::Float).ok_or_else(mismatch)
            }
            (serde_json::Value::String(s), FieldKind::String) => {
                Ok(FieldValue::String(s.clone()))
            }
            _ => Err(mismatch()),
        }
    }

    /// Returns `true` if this value conforms to the given field kind.
    pub fn matches_kind(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (FieldValue::Null, _)
                | (FieldValue::Bool(_), FieldKind::Bool)
                | (FieldValue::Int(_), FieldKind::Int)
                | (FieldValue::Float(_), FieldKind::Float)
                | (FieldValue::String(_), FieldKind::String)
                | (FieldValue::Bytes(_), FieldKind::Bytes)
        )
    }

    /// Ordering used by query filters.
    ///
    /// Ints and floats compare numerically across types. Values of unrelated
    /// types are unordered and return `None`.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => Some(Ordering::Equal),
            (FieldValue::Bool(a), FieldValue::Bool(b)) => Some(a.cmp(b)),
            (FieldValue::Int(a), FieldValue::Int(b)) => Some(a.cmp(b)),
            (FieldValue::Float(a), FieldValue::Float(b)) => a.partial_cmp(b),
            (FieldValue::Int(a), FieldValue::Float(b)) => (*a as f64).partial_cmp(b),
            (FieldValue::Float(a), FieldValue::Int(b)) => a.partial_cmp(&(*b as f64)),
            (FieldValue::String(a), FieldValue::String(b)) => Some(a.cmp(b)),
            (FieldValue::Bytes(a), FieldValue::Bytes(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cbor_roundtrip_all_variants() {
        let values = vec![
            FieldValue::Null,
            FieldValue::Bool(true),
            FieldValue::Int(-42),
            FieldValue::Float(1.82),
            FieldValue::String("John".to_string()),
            FieldValue::Bytes(vec![0xde, 0xad]),
        ];
        for v in values {
            let bytes = v.to_cbor().unwrap();
            assert_eq!(FieldValue::from_cbor(&bytes).unwrap(), v);
        }
    }

    #[test]
    fn cbor_encoding_is_deterministic() {
        let a = FieldValue::String("same".to_string()).to_cbor().unwrap();
        let b = FieldValue::String("same".to_string()).to_cbor().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn from_cbor_rejects_garbage() {
        assert!(FieldValue::from_cbor(&[0xff, 0x00, 0x01]).is_err());
    }

    #[test]
    fn from_json_respects_kind() {
        let v = serde_json::json!(21);
        assert_eq!(
            FieldValue::from_json(&v, FieldKind::Int).unwrap(),
            FieldValue::Int(21)
        );
        // An integer literal widens to float for float fields.
        assert_eq!(
            FieldValue::from_json(&v, FieldKind::Float).unwrap(),
            FieldValue::Float(21.0)
        );
        assert!(FieldValue::from_json(&v, FieldKind::String).is_err());
    }

    #[test]
    fn numeric_comparison_crosses_types() {
        let le = FieldValue::Float(1.82)
            .compare(&FieldValue::Int(2))
            .unwrap();
        assert_eq!(le, Ordering::Less);

        let eq = FieldValue::Int(2).compare(&FieldValue::Float(2.0)).unwrap();
        assert_eq!(eq, Ordering::Equal);
    }

    #[test]
    fn unrelated_types_are_unordered() {
        assert!(FieldValue::String("a".to_string())
            .compare(&FieldValue::Int(1))
            .is_none());
    }
}
