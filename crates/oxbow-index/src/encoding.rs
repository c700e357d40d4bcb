//! Order-preserving byte encodings for indexed field values.
//!
//! Each encoding starts with a type tag so values of different kinds never
//! collide, contains no `/` byte so entries stay unambiguous inside the
//! `/`-separated key layout, and preserves value order within numeric kinds
//! (fixed-width big-endian hex after an order-preserving bit transform).

use oxbow_types::FieldValue;

use crate::error::{IndexError, IndexResult};

/// The sentinel byte encoding a nil value. Sorts after every ASCII-tagged
/// encoding, so nils group together predictably at the end of the key space.
pub const NIL_SENTINEL: u8 = 0xf6;

const TAG_BOOL: u8 = b'b';
const TAG_INT: u8 = b'i';
const TAG_FLOAT: u8 = b'f';
const TAG_STRING: u8 = b's';
const TAG_BYTES: u8 = b'x';

/// Encode a field value for use as an index key segment.
pub fn encode_field_value(value: &FieldValue) -> Vec<u8> {
    match value {
        FieldValue::Null => vec![NIL_SENTINEL],
        FieldValue::Bool(b) => vec![TAG_BOOL, if *b { b'1' } else { b'0' }],
        FieldValue::Int(i) => {
            // Offset-binary: flipping the sign bit makes the unsigned order
            // equal the signed order.
            let bits = (*i as u64) ^ (1 << 63);
            tag_hex(TAG_INT, &bits.to_be_bytes())
        }
        FieldValue::Float(f) => {
            // IEEE-754 total order transform: flip all bits of negatives,
            // flip only the sign bit of positives.
            let bits = f.to_bits();
            let ordered = if bits >> 63 == 1 { !bits } else { bits ^ (1 << 63) };
            tag_hex(TAG_FLOAT, &ordered.to_be_bytes())
        }
        FieldValue::String(s) => {
            let mut out = vec![TAG_STRING];
            out.extend_from_slice(hex::encode(s.as_bytes()).as_bytes());
            out
        }
        FieldValue::Bytes(b) => {
            let mut out = vec![TAG_BYTES];
            out.extend_from_slice(hex::encode(b).as_bytes());
            out
        }
    }
}

/// Decode an index key segment back into a field value.
pub fn decode_field_value(bytes: &[u8]) -> IndexResult<FieldValue> {
    let invalid = || IndexError::InvalidEntry(format!("{bytes:?}"));
    match bytes.first() {
        Some(&NIL_SENTINEL) if bytes.len() == 1 => Ok(FieldValue::Null),
        Some(&TAG_BOOL) => match bytes.get(1) {
            Some(b'0') => Ok(FieldValue::Bool(false)),
            Some(b'1') => Ok(FieldValue::Bool(true)),
            _ => Err(invalid()),
        },
        Some(&TAG_INT) => {
            let bits = hex_u64(&bytes[1..]).ok_or_else(invalid)?;
            Ok(FieldValue::Int((bits ^ (1 << 63)) as i64))
        }
        Some(&TAG_FLOAT) => {
            let ordered = hex_u64(&bytes[1..]).ok_or_else(invalid)?;
            let bits = if ordered >> 63 == 0 { !ordered } else { ordered ^ (1 << 63) };
            Ok(FieldValue::Float(f64::from_bits(bits)))
        }
        Some(&TAG_STRING) => {
            let raw = hex::decode(&bytes[1..]).map_err(|_| invalid())?;
            String::from_utf8(raw)
                .map(FieldValue::String)
                .map_err(|_| invalid())
        }
        Some(&TAG_BYTES) => hex::decode(&bytes[1..])
            .map(FieldValue::Bytes)
            .map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn tag_hex(tag: u8, bytes: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend_from_slice(hex::encode(bytes).as_bytes());
    out
}

fn hex_u64(bytes: &[u8]) -> Option<u64> {
    let raw = hex::decode(bytes).ok()?;
    let arr: [u8; 8] = raw.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}
