//! Wire structures for delta blocks.
//!
//! Blocks are standard dag-pb nodes (`PbNode`/`PbLink`); the node `Data` is
//! an encoded [`Delta`]. The structs are hand-written prost messages so the
//! encoding is bit-compatible with any dag-pb implementation.

use std::collections::HashMap;

/// A dag-pb link to a parent block.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbLink {
    /// Binary CID of the target block.
    #[prost(bytes = "vec", optional, tag = "1")]
    pub hash: Option<Vec<u8>>,
    /// Link name. Unused by the clock, kept for dag-pb compatibility.
    #[prost(string, optional, tag = "2")]
    pub name: Option<String>,
    /// Cumulative target size. Unused by the clock.
    #[prost(uint64, optional, tag = "3")]
    pub tsize: Option<u64>,
}

/// A dag-pb node: delta payload plus parent links.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PbNode {
    #[prost(message, repeated, tag = "2")]
    pub links: Vec<PbLink>,
    #[prost(bytes = "vec", optional, tag = "1")]
    pub data: Option<Vec<u8>>,
}

/// The serialized delta carried in a node's `Data`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Delta {
    /// Logical clock value. Always ≥ 1; 0 marks a malformed delta.
    #[prost(uint64, tag = "1")]
    pub priority: u64,
    #[prost(enumeration = "DeltaKind", tag = "2")]
    pub kind: i32,
    #[prost(string, tag = "3")]
    pub doc_id: String,
    /// Decimal field id for register deltas; empty for composites.
    #[prost(string, tag = "4")]
    pub field_id: String,
    /// DAG-CBOR field value for register deltas.
    #[prost(bytes = "vec", tag = "5")]
    pub data: Vec<u8>,
    /// Document status for composites (see [`super::DocStatus`]).
    #[prost(uint32, tag = "6")]
    pub status: u32,
    /// Field id → binary CID of the field delta covered by this update.
    #[prost(map = "string, bytes", tag = "7")]
    pub sub_deltas: HashMap<String, Vec<u8>>,
    /// Schema root of the owning collection, carried for remote apply.
    #[prost(string, tag = "8")]
    pub schema_root: String,
}

/// Discriminator for the two delta shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DeltaKind {
    Unspecified = 0,
    LwwRegister = 1,
    Composite = 2,
}
