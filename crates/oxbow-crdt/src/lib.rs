//! CRDT Merkle clock and delta propagation for the Oxbow document database.
//!
//! Each document is a set of per-field last-writer-wins registers plus one
//! composite CRDT representing the logical document update event. Every write
//! produces a delta, serialized into a DAG-PB block whose links are the
//! previous heads; blocks are content addressed (CIDv1, SHA-256) and form a
//! Merkle DAG with priority-based causal ordering.
//!
//! The [`MerkleClock`] drives both sides: local writes advance the clock and
//! heads directly; remote blocks are applied idempotently, with missing
//! parents reported back to the caller for fetching.

pub mod block;
pub mod clock;
pub mod delta;
pub mod error;
pub mod heads;
mod merge;
pub mod pb;

pub use block::{decode_node, make_node, parent_cids, EncodedBlock, NodeLink, HEAD_LINK_NAME};
pub use clock::{block_key, MerkleClock, MissingLink, RemoteApply};
pub use delta::{CompositeDelta, Delta, DocStatus, LwwRegDelta};
pub use error::{CrdtError, CrdtResult};
pub use heads::HeadSet;
pub use merge::read_priority_record;
