use std::sync::{Arc, Mutex, RwLock};

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::multistore::Namespace;
use crate::traits::{KvPair, RootStore, WriteBatch};

struct TxnState {
    batch: WriteBatch,
    reads: Vec<Vec<u8>>,
    done: bool,
}

/// A transaction over the root store.
///
/// Reads observe a consistent snapshot taken at creation plus the
/// transaction's own writes; writes are batched and applied atomically on
/// [`commit`](Transaction::commit). Commit is optimistic: if any key read or
/// written changed after the snapshot, it fails with
/// [`StoreError::Conflict`] and nothing is applied.
///
/// A transaction is not intended for concurrent use by multiple tasks; wrap
/// it in a [`ConcurrentTransaction`] for that.
pub struct Transaction {
    root: Arc<dyn RootStore>,
    id: u64,
    readonly: bool,
    snapshot: u64,
    state: RwLock<TxnState>,
}

impl Transaction {
    pub(crate) fn new(root: Arc<dyn RootStore>, id: u64, readonly: bool) -> Self {
        let snapshot = root.begin();
        Self {
            root,
            id,
            readonly,
            snapshot,
            state: RwLock::new(TxnState {
                batch: WriteBatch::new(),
                reads: Vec::new(),
                done: false,
            }),
        }
    }

    /// The process-local monotonic transaction id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Read a key, observing own writes first, then the snapshot.
    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.done {
            return Err(StoreError::TxnDiscarded);
        }
        if let Some(pending) = state.batch.get(key) {
            return Ok(pending.clone());
        }
        state.reads.push(key.to_vec());
        drop(state);
        self.root.get_at(key, self.snapshot)
    }

    pub fn has(&self, key: &[u8]) -> StoreResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Stage a write.
    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        if self.readonly {
            return Err(StoreError::ReadOnlyTxn);
        }
        let mut state = self.state.write().expect("lock poisoned");
        if state.done {
            return Err(StoreError::TxnDiscarded);
        }
        state.batch.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    /// Stage a delete.
    pub fn delete(&self, key: &[u8]) -> StoreResult<()> {
        if self.readonly {
            return Err(StoreError::ReadOnlyTxn);
        }
        let mut state = self.state.write().expect("lock poisoned");
        if state.done {
            return Err(StoreError::TxnDiscarded);
        }
        state.batch.insert(key.to_vec(), None);
        Ok(())
    }

    /// Ordered scan of all keys with the given prefix, merging own writes
    /// over the snapshot.
    pub fn iter_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<KvPair>> {
        let state = self.state.read().expect("lock poisoned");
        if state.done {
            return Err(StoreError::TxnDiscarded);
        }
        let mut merged: std::collections::BTreeMap<Vec<u8>, Option<Vec<u8>>> = self
            .root
            .iter_prefix_at(prefix, self.snapshot)?
            .into_iter()
            .map(|(k, v)| (k, Some(v)))
            .collect();
        for (key, value) in state.batch.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.clone(), value.clone());
        }
        Ok(merged
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }

    /// Commit all staged writes atomically.
    pub fn commit(&self) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.done {
            return Err(StoreError::TxnDiscarded);
        }
        state.done = true;
        if state.batch.is_empty() {
            return Ok(());
        }
        let version = self.root.commit(self.snapshot, &state.reads, &state.batch)?;
        debug!(txn = self.id, version, writes = state.batch.len(), "transaction committed");
        Ok(())
    }

    /// Drop all staged writes. Idempotent.
    pub fn discard(&self) {
        let mut state = self.state.write().expect("lock poisoned");
        state.done = true;
        state.batch.clear();
        state.reads.clear();
    }

    /// A namespaced view over this transaction.
    pub fn substore(&self, namespace: Namespace) -> SubStore<'_> {
        SubStore {
            txn: self,
            namespace,
        }
    }

    /// Document field values.
    pub fn data(&self) -> SubStore<'_> {
        self.substore(Namespace::Data)
    }

    /// CRDT DAG heads.
    pub fn head(&self) -> SubStore<'_> {
        self.substore(Namespace::Head)
    }

    /// Content-addressed delta blocks.
    pub fn block(&self) -> SubStore<'_> {
        self.substore(Namespace::Block)
    }

    /// Schemas, collection descriptors, policies, sequences.
    pub fn system(&self) -> SubStore<'_> {
        self.substore(Namespace::System)
    }

    /// Peer subsystem state (replicators, p2p collections).
    pub fn peer(&self) -> SubStore<'_> {
        self.substore(Namespace::Peer)
    }
}

/// A key-prefixed view over a [`Transaction`].
///
/// Keys passed in are relative to the namespace; iteration results are
/// returned with the namespace stripped.
#[derive(Clone, Copy)]
pub struct SubStore<'a> {
    txn: &'a Transaction,
    namespace: Namespace,
}

impl SubStore<'_> {
    fn full_key(&self, key: &[u8]) -> Vec<u8> {
        let prefix = self.namespace.prefix().as_bytes();
        let mut full = Vec::with_capacity(prefix.len() + key.len());
        full.extend_from_slice(prefix);
        full.extend_from_slice(key);
        full
    }

    pub fn get(&self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        self.txn.get(&self.full_key(key))
    }

    pub fn has(&self, key: &[u8]) -> StoreResult<bool> {
        self.txn.has(&self.full_key(key))
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.txn.put(&self.full_key(key), value)
    }

    pub fn delete(&self, key: &[u8]) -> StoreResult<()> {
        self.txn.delete(&self.full_key(key))
    }

    pub fn iter_prefix(&self, prefix: &[u8]) -> StoreResult<Vec<KvPair>> {
        let namespace_len = self.namespace.prefix().len();
        let pairs = self.txn.iter_prefix(&self.full_key(prefix))?;
        Ok(pairs
            .into_iter()
            .map(|(k, v)| (k[namespace_len..].to_vec(), v))
            .collect())
    }
}

/// A transaction safe for concurrent operations from multiple tasks.
///
/// Each operation is serialized behind an internal mutex, so compound
/// operations (read, decide, write) remain atomic with respect to each other.
pub struct ConcurrentTransaction {
    inner: Transaction,
    op_lock: Mutex<()>,
}

impl ConcurrentTransaction {
    pub(crate) fn new(inner: Transaction) -> Self {
        Self {
            inner,
            op_lock: Mutex::new(()),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id()
    }

    /// Run a closure over the underlying transaction while holding the
    /// serialization lock.
    pub fn with<T>(&self, f: impl FnOnce(&Transaction) -> StoreResult<T>) -> StoreResult<T> {
        let _guard = self.op_lock.lock().expect("lock poisoned");
        f(&self.inner)
    }

    pub fn commit(&self) -> StoreResult<()> {
        let _guard = self.op_lock.lock().expect("lock poisoned");
        self.inner.commit()
    }

    pub fn discard(&self) {
        let _guard = self.op_lock.lock().expect("lock poisoned");
        self.inner.discard();
    }
}
