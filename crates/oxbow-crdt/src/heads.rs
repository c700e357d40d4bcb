use bytes::BytesMut;
use cid::Cid;
use oxbow_keys::{HeadStoreKey, Key};
use oxbow_store::SubStore;
use oxbow_types::DocId;
use prost::encoding::{decode_varint, encode_varint};

use crate::error::{CrdtError, CrdtResult};

/// The current head set of one `(docID, fieldID)` pair.
///
/// Heads live in the head store under `/<docID>/<fieldID>/<CID>` with the
/// head's priority as an unsigned varint value. After any apply the set is
/// the maximal antichain of the DAG restricted to that field: no head is an
/// ancestor of another.
pub struct HeadSet {
    doc_id: String,
    field_id: String,
}

impl HeadSet {
    pub fn new(doc_id: &DocId, field_component: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.as_str().to_string(),
            field_id: field_component.into(),
        }
    }

    fn key(&self, cid: &Cid) -> HeadStoreKey {
        HeadStoreKey {
            doc_id: self.doc_id.clone(),
            field_id: self.field_id.clone(),
            cid: Some(*cid),
        }
    }

    fn scan_prefix(&self) -> Vec<u8> {
        let mut prefix = HeadStoreKey {
            doc_id: self.doc_id.clone(),
            field_id: self.field_id.clone(),
            cid: None,
        }
        .to_bytes();
        prefix.push(b'/');
        prefix
    }

    /// All current heads in lexicographic CID order, plus the maximum
    /// priority among them (0 when there are none).
    pub fn list(&self, heads: &SubStore<'_>) -> CrdtResult<(Vec<Cid>, u64)> {
        let mut cids = Vec::new();
        let mut max_priority = 0;
        for (key, value) in heads.iter_prefix(&self.scan_prefix())? {
            let key_str = String::from_utf8_lossy(&key);
            let parsed = HeadStoreKey::parse(&key_str)?;
            let cid = parsed
                .cid
                .ok_or_else(|| CrdtError::InvalidCid(key_str.into_owned()))?;
            let priority = decode_priority(&value)?;
            max_priority = max_priority.max(priority);
            cids.push(cid);
        }
        // Keys sort lexicographically, so `cids` is already CID ordered.
        Ok((cids, max_priority))
    }

    pub fn contains(&self, heads: &SubStore<'_>, cid: &Cid) -> CrdtResult<bool> {
        Ok(heads.has(&self.key(cid).to_bytes())?)
    }

    /// Add a head with its priority.
    pub fn add(&self, heads: &SubStore<'_>, cid: &Cid, priority: u64) -> CrdtResult<()> {
        heads.put(&self.key(cid).to_bytes(), &encode_priority(priority))?;
        Ok(())
    }

    /// Remove a head.
    pub fn remove(&self, heads: &SubStore<'_>, cid: &Cid) -> CrdtResult<()> {
        heads.delete(&self.key(cid).to_bytes())?;
        Ok(())
    }

    /// Atomically (within the transaction) replace an old head with a new one.
    pub fn replace(
        &self,
        heads: &SubStore<'_>,
        old: &Cid,
        new: &Cid,
        priority: u64,
    ) -> CrdtResult<()> {
        self.remove(heads, old)?;
        self.add(heads, new, priority)
    }
}

pub(crate) fn encode_priority(priority: u64) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(10);
    encode_varint(priority, &mut buf);
    buf.to_vec()
}

pub(crate) fn decode_priority(bytes: &[u8]) -> CrdtResult<u64> {
    let mut buf = bytes;
    decode_varint(&mut buf).map_err(|e| CrdtError::MalformedDelta(format!("bad priority: {e}")))
}

/// Remaining bytes of a buffer after the leading varint, used by the data
/// store's priority instance which stores `varint(priority) ++ cid`.
pub(crate) fn split_priority(bytes: &[u8]) -> CrdtResult<(u64, &[u8])> {
    let mut buf = bytes;
    let priority = decode_varint(&mut buf)
        .map_err(|e| CrdtError::MalformedDelta(format!("bad priority: {e}")))?;
    Ok((priority, buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_store::{MemoryRootStore, MultiStore};
    use oxbow_types::{new_cid_dagpb, SchemaRoot, COMPOSITE_NAMESPACE};
    use std::sync::Arc;

    fn multistore() -> MultiStore {
        MultiStore::new(Arc::new(MemoryRootStore::new()))
    }

    fn doc() -> DocId {
        DocId::generate(b"heads tests", &SchemaRoot("r".to_string()))
    }

    #[test]
    fn empty_head_set() {
        let store = multistore();
        let txn = store.new_txn(false);
        let set = HeadSet::new(&doc(), "1");
        let (cids, priority) = set.list(&txn.head()).unwrap();
        assert!(cids.is_empty());
        assert_eq!(priority, 0);
    }

    #[test]
    fn add_list_remove() {
        let store = multistore();
        let txn = store.new_txn(false);
        let set = HeadSet::new(&doc(), "1");
        let cid = new_cid_dagpb(b"block one");

        set.add(&txn.head(), &cid, 4).unwrap();
        assert!(set.contains(&txn.head(), &cid).unwrap());
        let (cids, priority) = set.list(&txn.head()).unwrap();
        assert_eq!(cids, vec![cid]);
        assert_eq!(priority, 4);

        set.remove(&txn.head(), &cid).unwrap();
        assert!(!set.contains(&txn.head(), &cid).unwrap());
    }

    #[test]
    fn replace_swaps_heads() {
        let store = multistore();
        let txn = store.new_txn(false);
        let set = HeadSet::new(&doc(), "1");
        let old = new_cid_dagpb(b"old");
        let new = new_cid_dagpb(b"new");

        set.add(&txn.head(), &old, 1).unwrap();
        set.replace(&txn.head(), &old, &new, 2).unwrap();

        let (cids, priority) = set.list(&txn.head()).unwrap();
        assert_eq!(cids, vec![new]);
        assert_eq!(priority, 2);
    }

    #[test]
    fn list_reports_max_priority_of_concurrent_heads() {
        let store = multistore();
        let txn = store.new_txn(false);
        let set = HeadSet::new(&doc(), "1");
        set.add(&txn.head(), &new_cid_dagpb(b"a"), 3).unwrap();
        set.add(&txn.head(), &new_cid_dagpb(b"b"), 7).unwrap();

        let (cids, priority) = set.list(&txn.head()).unwrap();
        assert_eq!(cids.len(), 2);
        assert_eq!(priority, 7);
    }

    #[test]
    fn fields_do_not_share_heads() {
        let store = multistore();
        let txn = store.new_txn(false);
        let field = HeadSet::new(&doc(), "1");
        let composite = HeadSet::new(&doc(), COMPOSITE_NAMESPACE);

        field.add(&txn.head(), &new_cid_dagpb(b"f"), 1).unwrap();
        let (cids, _) = composite.list(&txn.head()).unwrap();
        assert!(cids.is_empty());
    }

    #[test]
    fn priority_varint_roundtrip() {
        for p in [1u64, 127, 128, 300, u64::MAX] {
            assert_eq!(decode_priority(&encode_priority(p)).unwrap(), p);
        }
    }
}
