use oxbow_keys::{Key, SequenceKey};

use crate::error::{StoreError, StoreResult};
use crate::txn::Transaction;

/// A monotonic counter persisted in the system store under `/seq/<name>`.
///
/// Values are allocated within the caller's transaction: if the transaction
/// aborts, the allocation is rolled back with it, and concurrent allocations
/// of the same sequence conflict at commit.
pub struct Sequence {
    key: SequenceKey,
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            key: SequenceKey::new(name),
        }
    }

    /// The current value, or 0 if the sequence has never been incremented.
    pub fn current(&self, txn: &Transaction) -> StoreResult<u64> {
        match txn.system().get(&self.key.to_bytes())? {
            Some(bytes) => decode(&bytes),
            None => Ok(0),
        }
    }

    /// Increment and return the next value.
    pub fn next(&self, txn: &Transaction) -> StoreResult<u64> {
        let next = self.current(txn)? + 1;
        txn.system().put(&self.key.to_bytes(), &next.to_be_bytes())?;
        Ok(next)
    }
}

fn decode(bytes: &[u8]) -> StoreResult<u64> {
    let arr: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::CorruptSequence(format!("{} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRootStore;
    use crate::multistore::MultiStore;
    use std::sync::Arc;

    fn multistore() -> MultiStore {
        MultiStore::new(Arc::new(MemoryRootStore::new()))
    }

    #[test]
    fn starts_at_one() {
        let store = multistore();
        let txn = store.new_txn(false);
        let seq = Sequence::new("collection");
        assert_eq!(seq.next(&txn).unwrap(), 1);
        assert_eq!(seq.next(&txn).unwrap(), 2);
    }

    #[test]
    fn persists_across_transactions() {
        let store = multistore();
        let seq = Sequence::new("collection");

        let txn = store.new_txn(false);
        seq.next(&txn).unwrap();
        seq.next(&txn).unwrap();
        txn.commit().unwrap();

        let txn = store.new_txn(false);
        assert_eq!(seq.current(&txn).unwrap(), 2);
        assert_eq!(seq.next(&txn).unwrap(), 3);
    }

    #[test]
    fn aborted_allocation_rolls_back() {
        let store = multistore();
        let seq = Sequence::new("collection");

        let txn = store.new_txn(false);
        seq.next(&txn).unwrap();
        txn.discard();

        let txn = store.new_txn(false);
        assert_eq!(seq.next(&txn).unwrap(), 1);
    }

    #[test]
    fn concurrent_allocations_conflict() {
        let store = multistore();
        let seq = Sequence::new("collection");

        let txn1 = store.new_txn(false);
        let txn2 = store.new_txn(false);
        assert_eq!(seq.next(&txn1).unwrap(), 1);
        assert_eq!(seq.next(&txn2).unwrap(), 1);

        txn1.commit().unwrap();
        assert_eq!(txn2.commit(), Err(StoreError::Conflict));
    }

    #[test]
    fn independent_sequences_do_not_interact() {
        let store = multistore();
        let txn = store.new_txn(false);
        assert_eq!(Sequence::new("collection").next(&txn).unwrap(), 1);
        assert_eq!(Sequence::new("index_1").next(&txn).unwrap(), 1);
    }

    #[test]
    fn corrupt_value_is_a_typed_error() {
        let store = multistore();
        let txn = store.new_txn(false);
        let key = SequenceKey::new("broken");
        txn.system().put(&key.to_bytes(), b"bad").unwrap();
        let seq = Sequence::new("broken");
        assert!(matches!(
            seq.current(&txn),
            Err(StoreError::CorruptSequence(_))
        ));
    }
}
