//! The update-event bus.
//!
//! Every committed document write publishes an [`Update`] record; the sync
//! peer consumes the stream and relays it to the pubsub network and to
//! registered replicators.

use cid::Cid;
use tokio::sync::broadcast;

use oxbow_types::{DocId, SchemaRoot};

/// Number of update events buffered per subscriber.
pub const UPDATE_EVENT_BUFFER_SIZE: usize = 100;

/// A committed document write, as broadcast on the internal bus.
#[derive(Clone, Debug, PartialEq)]
pub struct Update {
    pub doc_id: DocId,
    pub cid: Cid,
    pub schema_root: SchemaRoot,
    /// The composite delta block bytes, ready to push to peers.
    pub block: Vec<u8>,
    /// Priority of the composite delta: 1 marks a document creation.
    pub priority: u64,
}

/// Broadcast bus for update events.
///
/// Lagging subscribers lose the oldest events (the channel is bounded);
/// peers recover through replicator catch-up rather than backpressure.
pub struct EventBus {
    sender: broadcast::Sender<Update>,
}

impl EventBus {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Update> {
        self.sender.subscribe()
    }

    /// Publish an update. Dropped silently when nobody listens.
    pub fn publish(&self, update: Update) {
        let _ = self.sender.send(update);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(UPDATE_EVENT_BUFFER_SIZE)
    }
}
