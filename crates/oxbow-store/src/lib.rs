//! Ordered KV store traits, transactions, and the multi-store façade.
//!
//! A single root store holds all persistent state. The [`MultiStore`]
//! namespaces it into logical substores by key prefix (data, head, block,
//! system, peer); the [`Transaction`] provides snapshot reads and write
//! batching over all of them with optimistic commit.
//!
//! The production deployment plugs an on-disk engine in behind [`RootStore`];
//! [`MemoryRootStore`] is the embedded implementation used by tests and
//! ephemeral nodes.

pub mod error;
pub mod memory;
pub mod multistore;
pub mod sequence;
pub mod traits;
pub mod txn;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryRootStore;
pub use multistore::{MultiStore, Namespace};
pub use sequence::Sequence;
pub use traits::{KvPair, RootStore, WriteBatch};
pub use txn::{ConcurrentTransaction, SubStore, Transaction};

/// The sequence allocating collection ids.
pub const COLLECTION_SEQ: &str = "collection";

/// The sequence allocating index ids within a collection, named per root.
pub fn index_seq_name(collection_root: u32) -> String {
    format!("index_{collection_root}")
}
