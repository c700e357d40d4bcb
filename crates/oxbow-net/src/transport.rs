//! Transport seams and their loopback implementations.
//!
//! The real deployments plug a libp2p pubsub router, a block-exchange
//! protocol, and a gRPC client in behind these traits. The loopback
//! implementations wire peers together in-process for tests.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use cid::Cid;
use tokio::sync::broadcast;

use crate::error::{NetError, NetResult};
use crate::pb::PushLogRequest;

const TOPIC_CAPACITY: usize = 64;

/// A pubsub router with named topics.
#[async_trait]
pub trait PubSub: Send + Sync {
    /// Register a topic so later publishes reach subscribers.
    async fn add_topic(&self, topic: &str) -> NetResult<()>;

    /// Drop a topic registration.
    async fn remove_topic(&self, topic: &str) -> NetResult<()>;

    /// Publish a message on a topic.
    async fn publish(&self, topic: &str, data: Vec<u8>) -> NetResult<()>;

    /// Subscribe to a topic, creating it if needed.
    async fn subscribe(&self, topic: &str) -> NetResult<broadcast::Receiver<Vec<u8>>>;
}

/// Fetches blocks by CID from remote peers.
#[async_trait]
pub trait BlockExchange: Send + Sync {
    async fn get_block(&self, cid: &Cid) -> NetResult<Vec<u8>>;
}

/// Pushes log records to a replication target.
#[async_trait]
pub trait ReplicatorClient: Send + Sync {
    async fn push_log(&self, address: &str, request: PushLogRequest) -> NetResult<()>;
}

/// In-process pubsub: a broadcast channel per topic.
#[derive(Default)]
pub struct LoopbackPubSub {
    topics: RwLock<HashMap<String, broadcast::Sender<Vec<u8>>>>,
}

impl LoopbackPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.read().expect("lock poisoned").len()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        let mut topics = self.topics.write().expect("lock poisoned");
        topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl PubSub for LoopbackPubSub {
    async fn add_topic(&self, topic: &str) -> NetResult<()> {
        self.sender(topic);
        Ok(())
    }

    async fn remove_topic(&self, topic: &str) -> NetResult<()> {
        self.topics.write().expect("lock poisoned").remove(topic);
        Ok(())
    }

    async fn publish(&self, topic: &str, data: Vec<u8>) -> NetResult<()> {
        // A publish with no subscribers is not an error, mirroring a gossip
        // mesh with no peers on the topic.
        let _ = self.sender(topic).send(data);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> NetResult<broadcast::Receiver<Vec<u8>>> {
        Ok(self.sender(topic).subscribe())
    }
}

/// Block provider serving a database's own block store.
///
/// The local half of the block-exchange protocol; the remote half is the
/// external libp2p exchange behind the same trait.
pub struct DbBlockExchange {
    db: std::sync::Arc<oxbow_db::Db>,
}

impl DbBlockExchange {
    pub fn new(db: std::sync::Arc<oxbow_db::Db>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BlockExchange for DbBlockExchange {
    async fn get_block(&self, cid: &Cid) -> NetResult<Vec<u8>> {
        self.db
            .block(cid)
            .map_err(|e| NetError::Transport(e.to_string()))?
            .ok_or_else(|| NetError::Transport(format!("block {cid} not available")))
    }
}

/// In-process block provider backed by a map, for tests.
#[derive(Default)]
pub struct MemoryBlockExchange {
    blocks: Mutex<HashMap<Cid, Vec<u8>>>,
}

impl MemoryBlockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, cid: Cid, block: Vec<u8>) {
        self.blocks.lock().expect("lock poisoned").insert(cid, block);
    }
}

#[async_trait]
impl BlockExchange for MemoryBlockExchange {
    async fn get_block(&self, cid: &Cid) -> NetResult<Vec<u8>> {
        self.blocks
            .lock()
            .expect("lock poisoned")
            .get(cid)
            .cloned()
            .ok_or_else(|| NetError::Transport(format!("block {cid} not available")))
    }
}

/// Client double that records every push, for tests.
#[derive(Default)]
pub struct RecordingClient {
    pushed: Mutex<Vec<(String, PushLogRequest)>>,
}

impl RecordingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pushed(&self) -> Vec<(String, PushLogRequest)> {
        self.pushed.lock().expect("lock poisoned").clone()
    }
}

#[async_trait]
impl ReplicatorClient for RecordingClient {
    async fn push_log(&self, address: &str, request: PushLogRequest) -> NetResult<()> {
        self.pushed
            .lock()
            .expect("lock poisoned")
            .push((address.to_string(), request));
        Ok(())
    }
}
