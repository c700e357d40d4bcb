use cid::Cid;
use oxbow_keys::DataStoreKey;
use oxbow_store::Transaction;
use oxbow_types::{new_cid_dagpb, CollectionId, DocId};
use tracing::debug;

use crate::block::{decode_node, make_node, parent_cids, EncodedBlock, NodeLink};
use crate::delta::Delta;
use crate::error::CrdtResult;
use crate::heads::HeadSet;
use crate::merge::merge_delta;

/// A block referenced by an applied node but not yet present locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MissingLink {
    pub cid: Cid,
    /// `true` for a causal parent in the same DAG as the applied node;
    /// `false` for a named sub-delta (a field block referenced by a
    /// composite), which roots its own walk.
    pub is_parent: bool,
}

/// The outcome of applying a remote block.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteApply {
    /// The block was already present; nothing changed.
    AlreadyApplied { cid: Cid },
    /// The block was merged. `missing` lists referenced blocks not yet
    /// present, for the caller's DAG syncer to fetch.
    Applied {
        cid: Cid,
        priority: u64,
        missing: Vec<MissingLink>,
    },
}

/// The Merkle clock of one document within one transaction.
///
/// Local writes go through [`add_delta`](MerkleClock::add_delta): the delta's
/// priority is derived from the current heads, the block is persisted, the
/// delta merged, and the heads replaced. Remote blocks go through
/// [`apply_remote`](MerkleClock::apply_remote), which is idempotent and
/// reports missing blocks instead of failing.
pub struct MerkleClock<'a> {
    txn: &'a Transaction,
    doc_id: DocId,
    base: DataStoreKey,
}

impl<'a> MerkleClock<'a> {
    pub fn new(txn: &'a Transaction, collection_root: CollectionId, doc_id: &DocId) -> Self {
        let base = DataStoreKey::new(collection_root).with_doc_id(doc_id);
        Self {
            txn,
            doc_id: doc_id.clone(),
            base,
        }
    }

    /// Add a local delta:
    ///
    /// 1. read current heads for the delta's `(docID, fieldID)`,
    /// 2. set `priority = max(head priorities) + 1`,
    /// 3. serialize with the heads as parent links (composites also link
    ///    their field sub-deltas by name) and persist the block,
    /// 4. merge into the data store,
    /// 5. replace the heads with the new block.
    pub fn add_delta(&self, delta: &mut Delta) -> CrdtResult<EncodedBlock> {
        let head_set = HeadSet::new(&self.doc_id, delta.field_component());
        let (heads, max_priority) = head_set.list(&self.txn.head())?;
        let priority = max_priority + 1;
        delta.set_priority(priority);

        let named = match delta {
            Delta::Composite(composite) => composite
                .sub_deltas
                .iter()
                .map(|(field, cid)| (field.clone(), *cid))
                .collect(),
            Delta::LwwRegister(_) => Vec::new(),
        };
        let block = make_node(delta.encode(), &heads, &named);
        self.txn.block().put(&block_key(&block.cid), &block.data)?;

        merge_delta(self.txn, &self.base, delta, &block.cid)?;

        for old in &heads {
            head_set.remove(&self.txn.head(), old)?;
        }
        head_set.add(&self.txn.head(), &block.cid, priority)?;

        debug!(
            doc = %self.doc_id,
            field = delta.field_component(),
            priority,
            cid = %block.cid,
            "added local delta"
        );
        Ok(block)
    }

    /// Apply a block received from a remote peer.
    ///
    /// A no-op if the block is already stored. Otherwise the block is
    /// persisted and merged; referenced blocks that are not yet present are
    /// returned for the caller to fetch.
    pub fn apply_remote(&self, block_bytes: &[u8]) -> CrdtResult<RemoteApply> {
        let cid = new_cid_dagpb(block_bytes);
        self.apply_with_root(&cid, 0, block_bytes)
    }

    /// Apply a block fetched while walking down from `root`.
    ///
    /// The walk root (the original tip) is threaded through so head
    /// replacement always advances to the tip, never to an intermediate
    /// ancestor. Sub-delta fetches pass the block's own CID as the root.
    pub fn apply_fetched(
        &self,
        root: &Cid,
        root_priority: u64,
        block_bytes: &[u8],
    ) -> CrdtResult<RemoteApply> {
        self.apply_with_root(root, root_priority, block_bytes)
    }

    fn apply_with_root(
        &self,
        root: &Cid,
        root_priority: u64,
        block_bytes: &[u8],
    ) -> CrdtResult<RemoteApply> {
        let cid = new_cid_dagpb(block_bytes);
        if self.txn.block().has(&block_key(&cid))? {
            return Ok(RemoteApply::AlreadyApplied { cid });
        }

        let (delta_bytes, links) = decode_node(block_bytes)?;
        let delta = Delta::decode(&delta_bytes)?;

        // A block is the root of its own walk when it arrives directly off
        // the wire; its priority is then authoritative.
        let (root, root_priority) = if root == &cid {
            (cid, delta.priority())
        } else {
            (*root, root_priority)
        };

        self.txn.block().put(&block_key(&cid), block_bytes)?;
        let missing = self.process_node(&root, root_priority, &delta, &cid, &links)?;

        Ok(RemoteApply::Applied {
            cid,
            priority: delta.priority(),
            missing,
        })
    }

    fn process_node(
        &self,
        root: &Cid,
        root_priority: u64,
        delta: &Delta,
        node_cid: &Cid,
        links: &[NodeLink],
    ) -> CrdtResult<Vec<MissingLink>> {
        merge_delta(self.txn, &self.base, delta, node_cid)?;

        let mut missing = Vec::new();

        // Named sub-deltas live in other field DAGs; they are fetch targets
        // but never parents of this head set.
        for link in links.iter().filter(|l| !l.is_parent()) {
            if !self.txn.block().has(&block_key(&link.cid))? {
                missing.push(MissingLink {
                    cid: link.cid,
                    is_parent: false,
                });
            }
        }

        let head_set = HeadSet::new(&self.doc_id, delta.field_component());
        let parents = parent_cids(links);
        if parents.is_empty() {
            if !head_set.contains(&self.txn.head(), root)? {
                head_set.add(&self.txn.head(), root, root_priority)?;
            }
            return Ok(missing);
        }

        let mut advanced = false;
        let mut parents_missing = false;
        for parent in &parents {
            if head_set.contains(&self.txn.head(), parent)? {
                head_set.replace(&self.txn.head(), parent, root, root_priority)?;
                advanced = true;
            } else if !self.txn.block().has(&block_key(parent))? {
                parents_missing = true;
                missing.push(MissingLink {
                    cid: *parent,
                    is_parent: true,
                });
            }
            // Known but not a head: already superseded, nothing to do.
        }

        if !advanced && !parents_missing && !head_set.contains(&self.txn.head(), root)? {
            // Every parent is known but none was a head: the root is the tip
            // of a concurrent branch and becomes a head alongside the others.
            head_set.add(&self.txn.head(), root, root_priority)?;
        }

        Ok(missing)
    }

    /// Read the current heads for a field component.
    pub fn heads(&self, field_component: &str) -> CrdtResult<(Vec<Cid>, u64)> {
        HeadSet::new(&self.doc_id, field_component).list(&self.txn.head())
    }

    /// Fetch a stored block by CID.
    pub fn get_block(&self, cid: &Cid) -> CrdtResult<Option<Vec<u8>>> {
        Ok(self.txn.block().get(&block_key(cid))?)
    }
}

/// The block store key of a CID.
pub fn block_key(cid: &Cid) -> Vec<u8> {
    let mut key = Vec::with_capacity(64);
    key.push(b'/');
    key.extend_from_slice(cid.to_string().as_bytes());
    key
}
