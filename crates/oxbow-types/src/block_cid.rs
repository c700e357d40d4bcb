//! CID construction helpers.
//!
//! All Oxbow content identifiers are CIDv1 with a SHA-256 multihash at the
//! default length. Delta blocks carry parent links and use the dag-pb codec;
//! opaque content (document ids) uses the raw codec.

use cid::multihash::{Code, MultihashDigest};
use cid::Cid;
use libipld::IpldCodec;

/// Create a CIDv1 with the raw codec over the given data.
pub fn new_cid_raw(data: &[u8]) -> Cid {
    let hash = Code::Sha2_256.digest(data);
    Cid::new_v1(IpldCodec::Raw.into(), hash)
}

/// Create a CIDv1 with the dag-pb codec over the given data.
pub fn new_cid_dagpb(data: &[u8]) -> Cid {
    let hash = Code::Sha2_256.digest(data);
    Cid::new_v1(IpldCodec::DagPb.into(), hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_cid_is_deterministic() {
        let a = new_cid_raw(b"hello");
        let b = new_cid_raw(b"hello");
        assert_eq!(a, b);
    }

    #[test]
    fn codec_changes_the_cid() {
        let raw = new_cid_raw(b"same bytes");
        let pb = new_cid_dagpb(b"same bytes");
        assert_ne!(raw, pb);
        // Same multihash underneath, different codec.
        assert_eq!(raw.hash(), pb.hash());
    }

    #[test]
    fn cid_string_roundtrip() {
        let c = new_cid_raw(b"roundtrip");
        let s = c.to_string();
        let parsed = Cid::try_from(s.as_str()).unwrap();
        assert_eq!(c, parsed);
    }

    #[test]
    fn cids_are_v1() {
        assert_eq!(new_cid_raw(b"x").version(), cid::Version::V1);
        assert_eq!(new_cid_dagpb(b"x").version(), cid::Version::V1);
    }
}
