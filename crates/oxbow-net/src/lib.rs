//! Peer-to-peer synchronization for the Oxbow document database.
//!
//! The [`Peer`] relays committed writes from the database's update bus to
//! the pubsub network (one topic per document) and to registered
//! replicators. Inbound blocks are applied through the CRDT clock; blocks
//! whose parents are missing are fetched by a bounded worker pool through
//! the block exchange, each CID enqueued at most once.
//!
//! The libp2p host, pubsub router, and RPC codec are external
//! collaborators; this crate depends only on their interfaces
//! ([`PubSub`], [`BlockExchange`], [`ReplicatorClient`]) and ships loopback
//! implementations for tests.

pub mod dag_sync;
pub mod error;
pub mod pb;
pub mod peer;
pub mod transport;
pub mod wait;

pub use dag_sync::{DagJob, DagSyncer};
pub use error::{NetError, NetResult};
pub use pb::PushLogRequest;
pub use peer::{Peer, PeerConfig, Replicator};
pub use transport::{
    BlockExchange, DbBlockExchange, LoopbackPubSub, MemoryBlockExchange, PubSub, RecordingClient,
    ReplicatorClient,
};
pub use wait::{wait_for, WaitKind};
