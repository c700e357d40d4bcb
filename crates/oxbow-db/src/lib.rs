//! The Oxbow document database.
//!
//! [`Db`] ties the layers together: the multi-store over a single root
//! store, the CRDT Merkle clock, schema-described collections with secondary
//! indexes, the policy gate in front of every public operation, and the
//! update-event bus feeding the sync peer.
//!
//! Operations come in two transaction flavors: *implicit* (the database
//! creates, commits, and retries a transaction per call) and *explicit*
//! (`*_with_txn` variants composed by the caller).

pub mod collection;
pub mod db;
pub mod descriptions;
pub mod error;
pub mod events;
pub mod fetcher;
pub mod lens;
pub mod patch;
pub mod schema_definition;

pub use collection::Collection;
pub use db::{AcpConfig, Db, DbConfig};
pub use descriptions::CollectionFetchOptions;
pub use error::{DbError, DbResult};
pub use events::{EventBus, Update};
pub use fetcher::CollectionFetcher;
pub use lens::{DefaultsLens, LensRegistry};
pub use schema_definition::{FieldDefinition, SchemaDefinition};
