//! The sync peer.
//!
//! Outbound: consumes the database's update bus and relays each committed
//! write. Priority 1 is a creation: a pubsub topic named by the document id
//! is registered before publishing. Priorities above 1 publish on the
//! existing topic. Priority 0 is invalid and skipped with a warning. Every
//! relayed log is also pushed to the replicators registered for the
//! document's schema.
//!
//! Inbound: received blocks go to the CRDT clock; missing ancestors are
//! fetched by the DAG syncer's worker pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use oxbow_crdt::RemoteApply;
use oxbow_db::{Db, DbError, Update};
use oxbow_keys::{Key, P2pCollectionKey, ReplicatorKey};
use oxbow_types::{CollectionId, DocId, SchemaRoot};

use crate::dag_sync::{DagJob, DagSyncer, DEFAULT_DAG_WORKERS};
use crate::error::{NetError, NetResult};
use crate::pb::PushLogRequest;
use crate::transport::{BlockExchange, PubSub, ReplicatorClient};
use crate::wait::DEFAULT_EVENT_TIMEOUT;

/// Grace period for shutting down background tasks before aborting them.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Peer configuration.
#[derive(Clone, Debug)]
pub struct PeerConfig {
    /// Our own peer id; replication targets must differ.
    pub peer_id: String,
    /// Number of DAG fetch workers.
    pub dag_workers: usize,
    /// Bound on event waits.
    pub event_timeout: Duration,
}

impl PeerConfig {
    pub fn new(peer_id: impl Into<String>) -> Self {
        Self {
            peer_id: peer_id.into(),
            dag_workers: DEFAULT_DAG_WORKERS,
            event_timeout: DEFAULT_EVENT_TIMEOUT,
        }
    }
}

/// A persisted replication target.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Replicator {
    pub peer_id: String,
    pub address: String,
    pub schema_root: String,
    pub collection: String,
}

/// The peer node: relays local writes outward and applies remote blocks.
pub struct Peer {
    db: Arc<Db>,
    pubsub: Arc<dyn PubSub>,
    client: Arc<dyn ReplicatorClient>,
    syncer: DagSyncer,
    /// schema root → peer id → address.
    replicators: Mutex<HashMap<String, HashMap<String, String>>>,
    cancel: CancellationToken,
    relay: Mutex<Option<JoinHandle<()>>>,
    config: PeerConfig,
}

impl Peer {
    /// Build a peer over the database and its transports, reloading any
    /// persisted replicator registrations.
    pub fn new(
        db: Arc<Db>,
        pubsub: Arc<dyn PubSub>,
        client: Arc<dyn ReplicatorClient>,
        exchange: Arc<dyn BlockExchange>,
        config: PeerConfig,
    ) -> NetResult<Self> {
        let cancel = CancellationToken::new();
        let syncer = DagSyncer::start(
            Arc::clone(&db),
            exchange,
            config.dag_workers,
            cancel.clone(),
        );

        let mut replicators: HashMap<String, HashMap<String, String>> = HashMap::new();
        let txn = db.new_txn(true);
        for (_, value) in txn.peer().iter_prefix(b"/replicator/id/")? {
            let record: Replicator = serde_json::from_slice(&value)
                .map_err(|e| NetError::Transport(format!("corrupt replicator record: {e}")))?;
            replicators
                .entry(record.schema_root.clone())
                .or_default()
                .insert(record.peer_id, record.address);
        }

        Ok(Self {
            db,
            pubsub,
            client,
            syncer,
            replicators: Mutex::new(replicators),
            cancel,
            relay: Mutex::new(None),
            config,
        })
    }

    pub fn config(&self) -> &PeerConfig {
        &self.config
    }

    /// Start the broadcast-relay task.
    pub fn start(self: &Arc<Self>) {
        let peer = Arc::clone(self);
        let mut events = self.db.events().subscribe();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            debug!("waiting for messages on the update bus");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = events.recv() => match received {
                        Ok(update) => {
                            if let Err(e) = peer.handle_update(update).await {
                                error!(error = %e, "error while handling broadcast log");
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "update bus lagged; replicator catch-up will cover the gap");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            debug!("relay loop stopped");
        });
        *self.relay.lock().expect("lock poisoned") = Some(handle);
    }

    /// Stop the relay and the DAG workers, aborting after the grace period.
    pub async fn close(&self) {
        self.cancel.cancel();
        if let Some(handle) = self.relay.lock().expect("lock poisoned").take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err() {
                warn!("peer relay was shut down ungracefully");
            }
        }
        self.syncer.shutdown().await;
    }

    /// Relay one committed write.
    async fn handle_update(&self, update: Update) -> NetResult<()> {
        match update.priority {
            0 => {
                warn!(cid = %update.cid, "skipping log with invalid priority of 0");
                return Ok(());
            }
            1 => self.handle_doc_create_log(&update).await?,
            _ => self.handle_doc_update_log(&update).await?,
        }
        self.push_log_to_replicators(&update).await;
        Ok(())
    }

    /// A creation registers the document's pubsub topic, then publishes.
    async fn handle_doc_create_log(&self, update: &Update) -> NetResult<()> {
        debug!(doc = %update.doc_id, "registering a new document for our peer node");
        self.pubsub.add_topic(update.doc_id.as_str()).await?;
        self.publish_log(update).await
    }

    async fn handle_doc_update_log(&self, update: &Update) -> NetResult<()> {
        debug!(doc = %update.doc_id, cid = %update.cid, "preparing pubsub push-log from broadcast");
        self.publish_log(update).await
    }

    async fn publish_log(&self, update: &Update) -> NetResult<()> {
        let request = PushLogRequest::from_update(update);
        self.pubsub
            .publish(update.doc_id.as_str(), request.encode_to_bytes())
            .await
    }

    async fn push_log_to_replicators(&self, update: &Update) {
        let targets: Vec<(String, String)> = {
            let replicators = self.replicators.lock().expect("lock poisoned");
            replicators
                .get(update.schema_root.as_str())
                .map(|peers| {
                    peers
                        .iter()
                        .map(|(id, addr)| (id.clone(), addr.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        let request = PushLogRequest::from_update(update);
        for (peer_id, address) in targets {
            if let Err(e) = self.client.push_log(&address, request.clone()).await {
                error!(
                    cid = %update.cid,
                    doc = %update.doc_id,
                    replicator = %peer_id,
                    error = %e,
                    "failed pushing log to replicator"
                );
            }
        }
    }

    // -----------------------------------------------------------------------
    // Replicators
    // -----------------------------------------------------------------------

    /// Register a replication target for a collection and start the initial
    /// catch-up in the background. The returned handle resolves when the
    /// catch-up pass completes.
    pub async fn add_replicator(
        &self,
        collection_name: &str,
        peer_id: &str,
        address: &str,
    ) -> NetResult<JoinHandle<()>> {
        if peer_id == self.config.peer_id {
            return Err(NetError::SelfTarget);
        }
        let collection = self.db.collection(collection_name)?;
        let schema_root = collection.schema().root.clone();

        {
            let mut replicators = self.replicators.lock().expect("lock poisoned");
            let peers = replicators.entry(schema_root.as_str().to_string()).or_default();
            if peers.contains_key(peer_id) {
                return Err(NetError::ReplicatorExists {
                    collection: collection_name.to_string(),
                    peer_id: peer_id.to_string(),
                });
            }
            peers.insert(peer_id.to_string(), address.to_string());
        }

        let record = Replicator {
            peer_id: peer_id.to_string(),
            address: address.to_string(),
            schema_root: schema_root.as_str().to_string(),
            collection: collection_name.to_string(),
        };
        let txn = self.db.new_txn(false);
        let key = ReplicatorKey::new(peer_id);
        let bytes = serde_json::to_vec(&record)
            .map_err(|e| NetError::Transport(e.to_string()))?;
        txn.peer().put(&key.to_bytes(), &bytes)?;
        txn.commit()?;

        info!(collection = collection_name, replicator = peer_id, "replicator added");

        // Initial catch-up: stream every document's head blocks to the new
        // target. Idempotent at the receiver.
        let db = Arc::clone(&self.db);
        let client = Arc::clone(&self.client);
        let name = collection_name.to_string();
        let address = address.to_string();
        let handle = tokio::spawn(async move {
            if let Err(e) = catch_up(&db, client.as_ref(), &name, &address).await {
                error!(collection = %name, error = %e, "replicator catch-up failed");
            }
        });
        Ok(handle)
    }

    /// The registered replicators, by schema root.
    pub fn replicators(&self) -> HashMap<String, HashMap<String, String>> {
        self.replicators.lock().expect("lock poisoned").clone()
    }

    // -----------------------------------------------------------------------
    // Inbound
    // -----------------------------------------------------------------------

    /// Apply a pushed log record. Missing ancestors are handed to the DAG
    /// syncer; malformed blocks are logged and dropped.
    pub async fn handle_push_log(&self, request: PushLogRequest) -> NetResult<()> {
        let (doc_id, schema_root, _cid) = request.parts()?;
        match self
            .db
            .apply_remote_block(&doc_id, &schema_root, &request.block)
        {
            Ok(RemoteApply::Applied { cid, priority, missing }) if !missing.is_empty() => {
                let base = DagJob {
                    doc_id,
                    schema_root,
                    root_cid: cid,
                    root_priority: priority,
                    cid,
                };
                self.syncer.enqueue_missing(&base, missing).await;
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(DbError::Crdt(e)) => {
                // Never crashes the apply loop; the block is dropped.
                warn!(doc = %request.doc_key, error = %e, "dropping malformed block");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Subscribe to a document's topic and apply everything published on it.
    pub async fn listen_to_doc(self: &Arc<Self>, doc_id: &DocId) -> NetResult<()> {
        let mut rx = self.pubsub.subscribe(doc_id.as_str()).await?;
        let peer = Arc::clone(self);
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(data) => match PushLogRequest::decode_from_bytes(&data) {
                            Ok(request) => {
                                if let Err(e) = peer.handle_push_log(request).await {
                                    error!(error = %e, "failed applying pubsub block");
                                }
                            }
                            Err(e) => warn!(error = %e, "dropping undecodable pubsub message"),
                        },
                        Err(_) => break,
                    },
                }
            }
        });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Collection topics
    // -----------------------------------------------------------------------

    /// Persist a collection-topic registration.
    pub fn register_p2p_collection(&self, collection_id: CollectionId) -> NetResult<()> {
        let txn = self.db.new_txn(false);
        let key = P2pCollectionKey::new(collection_id.to_string());
        txn.peer().put(&key.to_bytes(), &[])?;
        txn.commit()?;
        Ok(())
    }

    /// All persisted collection-topic registrations.
    pub fn p2p_collections(&self) -> NetResult<Vec<String>> {
        let txn = self.db.new_txn(true);
        let mut ids = Vec::new();
        for (key, _) in txn.peer().iter_prefix(b"/p2p/collection/")? {
            let key_str = String::from_utf8_lossy(&key);
            let parsed = P2pCollectionKey::parse(&key_str)
                .map_err(|e| NetError::Transport(e.to_string()))?;
            ids.push(parsed.collection_id);
        }
        Ok(ids)
    }
}

/// Stream every head block of every document in the collection to a target.
async fn catch_up(
    db: &Db,
    client: &dyn ReplicatorClient,
    collection_name: &str,
    address: &str,
) -> NetResult<()> {
    let collection = db.collection(collection_name)?;
    let schema_root = collection.schema().root.clone();

    for doc_id in collection.all_doc_ids()? {
        let (heads, priority) = match collection.composite_heads(&doc_id) {
            Ok(heads) => heads,
            Err(e) => {
                error!(doc = %doc_id, error = %e, "failed to get heads for replicator catch-up");
                continue;
            }
        };
        for head in heads {
            let Some(block) = collection.get_block(&doc_id, &head)? else {
                error!(cid = %head, "failed to get block for replicator catch-up");
                continue;
            };
            let request = PushLogRequest {
                doc_key: doc_id.as_str().to_string(),
                cid: head.to_bytes(),
                schema_root: schema_root.as_str().to_string(),
                block,
                priority,
            };
            if let Err(e) = client.push_log(address, request).await {
                error!(cid = %head, error = %e, "failed to replicate log");
            }
        }
    }
    Ok(())
}
