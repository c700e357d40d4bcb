//! Storage key model for the Oxbow document database.
//!
//! All persistent state lives under structured UTF-8 byte keys with `/` as
//! the separator. Keys sort lexicographically, which the range scans
//! throughout the system rely on. Every key type encodes to a string and to
//! bytes, parses back from a string with typed errors (never a panic), and
//! supports [`prefix end`](prefix::bytes_prefix_end) computation for bounded
//! iteration.
//!
//! Namespaces:
//!
//! - `/collection/id|name|version|index|policy/...` — collection metadata
//! - `/schema/version/v|r/...` — immutable schema contents and root index
//! - `/seq/<name>` — monotonic counters
//! - `/<collectionRootID>/<instance>/<docID>[/<fieldID>]` — document data
//! - `/<collectionID>/<indexID>/<fieldValue>…` — secondary index entries
//! - `/<collectionRootID>/pk/<docID>` — primary key lookup
//! - `/<docID>/<fieldID>/<CID>` — CRDT heads (head store)
//! - `/replicator/id/<id>`, `/p2p/collection/<id>` — peer subsystem

pub mod datastore;
pub mod error;
pub mod headstore;
pub mod index;
pub mod prefix;
pub mod system;

pub use datastore::{DataStoreKey, InstanceType, PrimaryDataStoreKey};
pub use error::{KeyError, KeyResult};
pub use headstore::HeadStoreKey;
pub use index::IndexDataStoreKey;
pub use prefix::{bytes_prefix_end, KEY_MAX, KEY_MIN};
pub use system::{
    CollectionIndexKey, CollectionKey, CollectionNameKey, CollectionPolicyKey,
    CollectionSchemaVersionKey, P2pCollectionKey, ReplicatorKey, SchemaRootKey, SchemaVersionKey,
    SequenceKey,
};

/// A structured storage key.
pub trait Key {
    /// The canonical string form of the key.
    fn to_key_string(&self) -> String;

    /// The byte form stored in the underlying KV store.
    fn to_bytes(&self) -> Vec<u8> {
        self.to_key_string().into_bytes()
    }
}
