use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::traits::{KvPair, RootStore, WriteBatch};

/// A single key's committed history, newest last.
type History = Vec<(u64, Option<Vec<u8>>)>;

/// In-memory, multi-versioned root store.
///
/// Every committed version of a key is retained, which keeps snapshot reads
/// exact for any live transaction. Intended for tests and ephemeral nodes;
/// durable deployments plug an on-disk engine in behind [`RootStore`].
pub struct MemoryRootStore {
    entries: RwLock<BTreeMap<Vec<u8>, History>>,
    /// Last committed version. Snapshots read at this version.
    version: AtomicU64,
}

impl MemoryRootStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            version: AtomicU64::new(0),
        }
    }

    /// Number of live keys at the latest version.
    pub fn len(&self) -> usize {
        let entries = self.entries.read().expect("lock poisoned");
        entries
            .values()
            .filter(|history| matches!(history.last(), Some((_, Some(_)))))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn visible_at(history: &History, version: u64) -> Option<Vec<u8>> {
        history
            .iter()
            .rev()
            .find(|(v, _)| *v <= version)
            .and_then(|(_, value)| value.clone())
    }

    fn modified_after(history: &History, version: u64) -> bool {
        history.last().map(|(v, _)| *v > version).unwrap_or(false)
    }
}

impl Default for MemoryRootStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RootStore for MemoryRootStore {
    fn begin(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn get_at(&self, key: &[u8], version: u64) -> StoreResult<Option<Vec<u8>>> {
        let entries = self.entries.read().expect("lock poisoned");
        Ok(entries
            .get(key)
            .and_then(|history| Self::visible_at(history, version)))
    }

    fn iter_prefix_at(&self, prefix: &[u8], version: u64) -> StoreResult<Vec<KvPair>> {
        let entries = self.entries.read().expect("lock poisoned");
        let mut result = Vec::new();
        for (key, history) in entries.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            if let Some(value) = Self::visible_at(history, version) {
                result.push((key.clone(), value));
            }
        }
        Ok(result)
    }

    fn commit(&self, base_version: u64, reads: &[Vec<u8>], batch: &WriteBatch) -> StoreResult<u64> {
        // Single writer at a time: the write lock is the commit point.
        let mut entries = self.entries.write().expect("lock poisoned");

        for key in reads.iter().chain(batch.keys()) {
            if let Some(history) = entries.get(key) {
                if Self::modified_after(history, base_version) {
                    return Err(StoreError::Conflict);
                }
            }
        }

        let next = self.version.load(Ordering::SeqCst) + 1;
        for (key, value) in batch {
            entries.entry(key.clone()).or_default().push((next, value.clone()));
        }
        self.version.store(next, Ordering::SeqCst);
        Ok(next)
    }
}

impl std::fmt::Debug for MemoryRootStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRootStore")
            .field("keys", &self.len())
            .field("version", &self.version.load(Ordering::SeqCst))
            .finish()
    }
}
