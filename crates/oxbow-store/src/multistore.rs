use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::traits::RootStore;
use crate::txn::{ConcurrentTransaction, Transaction};

/// The logical substores carved out of the root store by key prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Document field values (`v`/`p`/`d` instances).
    Data,
    /// CRDT DAG heads.
    Head,
    /// Content-addressed delta blocks.
    Block,
    /// Schemas, collection descriptors, policies, sequences.
    System,
    /// Peer subsystem state.
    Peer,
}

impl Namespace {
    /// The key prefix carving this namespace out of the root store.
    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::Data => "/data",
            Namespace::Head => "/head",
            Namespace::Block => "/block",
            Namespace::System => "/system",
            Namespace::Peer => "/peer",
        }
    }
}

/// The multi-store façade: owns the root store handle and creates
/// transactions spanning all substores.
///
/// Transaction ids are process-local and monotonic.
pub struct MultiStore {
    root: Arc<dyn RootStore>,
    previous_txn_id: AtomicU64,
}

impl MultiStore {
    pub fn new(root: Arc<dyn RootStore>) -> Self {
        Self {
            root,
            previous_txn_id: AtomicU64::new(0),
        }
    }

    /// The root store handle.
    pub fn root(&self) -> Arc<dyn RootStore> {
        Arc::clone(&self.root)
    }

    /// Create a new transaction.
    pub fn new_txn(&self, readonly: bool) -> Transaction {
        let id = self.previous_txn_id.fetch_add(1, Ordering::SeqCst) + 1;
        Transaction::new(Arc::clone(&self.root), id, readonly)
    }

    /// Create a new transaction that supports concurrent operations.
    pub fn new_concurrent_txn(&self, readonly: bool) -> ConcurrentTransaction {
        ConcurrentTransaction::new(self.new_txn(readonly))
    }
}

impl std::fmt::Debug for MultiStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiStore")
            .field(
                "previous_txn_id",
                &self.previous_txn_id.load(Ordering::SeqCst),
            )
            .finish()
    }
}
