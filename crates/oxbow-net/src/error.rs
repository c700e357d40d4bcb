use thiserror::Error;

pub type NetResult<T> = Result<T, NetError>;

/// Errors produced by the sync peer.
#[derive(Debug, Error)]
pub enum NetError {
    #[error("timed out waiting for peer connection")]
    PeerConnectionTimeout,

    #[error("timed out waiting for pubsub delivery")]
    PubSubTimeout,

    #[error("timed out waiting for push-log")]
    PushLogTimeout,

    #[error("replicator already exists for {collection} with id {peer_id}")]
    ReplicatorExists { collection: String, peer_id: String },

    #[error("can't target ourselves as a replicator")]
    SelfTarget,

    #[error(transparent)]
    Db(#[from] oxbow_db::DbError),

    #[error(transparent)]
    Store(#[from] oxbow_store::StoreError),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("invalid push-log request: {0}")]
    InvalidRequest(String),
}
