//! CRDT merge functions applying deltas to the data store.

use cid::Cid;
use oxbow_keys::{DataStoreKey, Key};
use oxbow_store::Transaction;
use oxbow_types::COMPOSITE_NAMESPACE;

use crate::delta::{CompositeDelta, Delta, DocStatus, LwwRegDelta};
use crate::error::CrdtResult;
use crate::heads::{encode_priority, split_priority};

/// Apply a delta to the current document state under the data store.
///
/// The merge is commutative and idempotent: for each register the stored
/// value is replaced only if the incoming `(priority, cid)` is strictly
/// greater than the current one, with CID bytes breaking priority ties so
/// every peer converges to the same winner.
pub(crate) fn merge_delta(
    txn: &Transaction,
    base: &DataStoreKey,
    delta: &Delta,
    block_cid: &Cid,
) -> CrdtResult<()> {
    match delta {
        Delta::LwwRegister(d) => merge_register(txn, base, d, block_cid),
        Delta::Composite(d) => merge_composite(txn, base, d, block_cid),
    }
}

fn merge_register(
    txn: &Transaction,
    base: &DataStoreKey,
    delta: &LwwRegDelta,
    block_cid: &Cid,
) -> CrdtResult<()> {
    let priority_key = base
        .clone()
        .with_priority_flag()
        .with_field_id(delta.field_id.clone());
    if !wins(txn, &priority_key, delta.priority, block_cid)? {
        return Ok(());
    }

    let value_key = base
        .clone()
        .with_value_flag()
        .with_field_id(delta.field_id.clone());
    txn.data().put(&value_key.to_bytes(), &delta.data)?;
    write_priority_record(txn, &priority_key, delta.priority, block_cid)
}

fn merge_composite(
    txn: &Transaction,
    base: &DataStoreKey,
    delta: &CompositeDelta,
    block_cid: &Cid,
) -> CrdtResult<()> {
    let priority_key = base
        .clone()
        .with_priority_flag()
        .with_field_id(COMPOSITE_NAMESPACE);
    if !wins(txn, &priority_key, delta.priority, block_cid)? {
        return Ok(());
    }
    write_priority_record(txn, &priority_key, delta.priority, block_cid)?;

    if delta.status == DocStatus::Deleted {
        let deleted_key = base.clone().with_deleted_flag();
        txn.data().put(&deleted_key.to_bytes(), &[1])?;
    }
    Ok(())
}

/// Returns `true` if `(priority, cid)` beats the currently stored record.
fn wins(
    txn: &Transaction,
    priority_key: &DataStoreKey,
    priority: u64,
    block_cid: &Cid,
) -> CrdtResult<bool> {
    match txn.data().get(&priority_key.to_bytes())? {
        None => Ok(true),
        Some(record) => {
            let (current_priority, current_cid) = split_priority(&record)?;
            Ok((priority, block_cid.to_bytes().as_slice())
                > (current_priority, current_cid))
        }
    }
}

fn write_priority_record(
    txn: &Transaction,
    priority_key: &DataStoreKey,
    priority: u64,
    block_cid: &Cid,
) -> CrdtResult<()> {
    let mut record = encode_priority(priority);
    record.extend_from_slice(&block_cid.to_bytes());
    txn.data().put(&priority_key.to_bytes(), &record)?;
    Ok(())
}

/// Read the stored `(priority, cid)` record for a field, if any.
pub fn read_priority_record(
    txn: &Transaction,
    base: &DataStoreKey,
    field_component: &str,
) -> CrdtResult<Option<(u64, Cid)>> {
    let priority_key = base
        .clone()
        .with_priority_flag()
        .with_field_id(field_component);
    match txn.data().get(&priority_key.to_bytes())? {
        None => Ok(None),
        Some(record) => {
            let (priority, cid_bytes) = split_priority(&record)?;
            let cid = Cid::try_from(cid_bytes)
                .map_err(|e| crate::CrdtError::InvalidCid(e.to_string()))?;
            Ok(Some((priority, cid)))
        }
    }
}
