use cid::Cid;
use oxbow_types::new_cid_dagpb;
use prost::Message;

use crate::error::{CrdtError, CrdtResult};
use crate::pb;

/// The link name marking a causal parent (a previous head).
///
/// Composite nodes additionally carry links named by field id, pointing at
/// the field-level delta blocks covered by the document update, so a peer
/// holding only the composite DAG can reach every field DAG.
pub const HEAD_LINK_NAME: &str = "_head";

/// A decoded dag-pb link.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeLink {
    pub name: String,
    pub cid: Cid,
}

impl NodeLink {
    /// Whether this link points at a causal parent rather than a sub-delta.
    pub fn is_parent(&self) -> bool {
        self.name == HEAD_LINK_NAME
    }
}

/// An encoded delta block: the dag-pb node bytes and their CID.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedBlock {
    pub cid: Cid,
    pub data: Vec<u8>,
}

/// Build a dag-pb node from an encoded delta, its causal parents, and any
/// named sub-delta links.
///
/// All links are sorted by (name, CID bytes) so the node encoding (and
/// therefore the block CID) is identical on every peer regardless of head
/// enumeration order.
pub fn make_node(
    delta_bytes: Vec<u8>,
    parents: &[Cid],
    named: &[(String, Cid)],
) -> EncodedBlock {
    let mut links: Vec<(String, Cid)> = parents
        .iter()
        .map(|cid| (HEAD_LINK_NAME.to_string(), *cid))
        .chain(named.iter().cloned())
        .collect();
    links.sort_by(|a, b| (&a.0, a.1.to_bytes()).cmp(&(&b.0, b.1.to_bytes())));

    let node = pb::PbNode {
        links: links
            .into_iter()
            .map(|(name, cid)| pb::PbLink {
                hash: Some(cid.to_bytes()),
                name: Some(name),
                tsize: None,
            })
            .collect(),
        data: Some(delta_bytes),
    };
    let data = node.encode_to_vec();
    EncodedBlock {
        cid: new_cid_dagpb(&data),
        data,
    }
}

/// Decode a dag-pb node into its delta payload and links.
pub fn decode_node(bytes: &[u8]) -> CrdtResult<(Vec<u8>, Vec<NodeLink>)> {
    let node =
        pb::PbNode::decode(bytes).map_err(|e| CrdtError::MalformedDelta(e.to_string()))?;
    let mut links = Vec::with_capacity(node.links.len());
    for link in node.links {
        let hash = link
            .hash
            .ok_or_else(|| CrdtError::InvalidCid("link without hash".to_string()))?;
        let cid =
            Cid::try_from(hash.as_slice()).map_err(|e| CrdtError::InvalidCid(e.to_string()))?;
        links.push(NodeLink {
            name: link.name.unwrap_or_default(),
            cid,
        });
    }
    Ok((node.data.unwrap_or_default(), links))
}

/// The parent CIDs of a decoded node.
pub fn parent_cids(links: &[NodeLink]) -> Vec<Cid> {
    links
        .iter()
        .filter(|l| l.is_parent())
        .map(|l| l.cid)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_types::new_cid_raw;

    #[test]
    fn roundtrip_with_parents_and_named_links() {
        let parents = vec![new_cid_raw(b"p1"), new_cid_raw(b"p2")];
        let named = vec![("1".to_string(), new_cid_raw(b"f1"))];
        let block = make_node(b"payload".to_vec(), &parents, &named);

        let (data, links) = decode_node(&block.data).unwrap();
        assert_eq!(data, b"payload".to_vec());
        assert_eq!(links.len(), 3);
        assert_eq!(parent_cids(&links).len(), 2);
        assert!(links
            .iter()
            .any(|l| l.name == "1" && l.cid == new_cid_raw(b"f1")));
    }

    #[test]
    fn parent_order_does_not_change_the_cid() {
        let a = new_cid_raw(b"a");
        let b = new_cid_raw(b"b");
        let block1 = make_node(b"x".to_vec(), &[a, b], &[]);
        let block2 = make_node(b"x".to_vec(), &[b, a], &[]);
        assert_eq!(block1.cid, block2.cid);
    }

    #[test]
    fn cid_matches_recomputation() {
        let block = make_node(b"x".to_vec(), &[], &[]);
        assert_eq!(block.cid, new_cid_dagpb(&block.data));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_node(&[0x99, 0x98, 0x97]).is_err());
    }
}
