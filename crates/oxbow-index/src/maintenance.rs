//! Synchronous index maintenance.

use oxbow_keys::{IndexDataStoreKey, Key};
use oxbow_store::Transaction;
use oxbow_types::{CollectionDescription, Document, FieldValue, IndexDescription};
use tracing::debug;

use crate::encoding::encode_field_value;
use crate::error::{IndexError, IndexResult};

/// Maintains every index of one collection inside one transaction.
///
/// Entries are written in the same transaction as the document mutation, so
/// an uncommitted write is visible in all of its indexes or none of them.
pub struct IndexManager<'a> {
    txn: &'a Transaction,
    collection: &'a CollectionDescription,
}

impl<'a> IndexManager<'a> {
    pub fn new(txn: &'a Transaction, collection: &'a CollectionDescription) -> Self {
        Self { txn, collection }
    }

    /// Write entries for a newly created document.
    pub fn save(&self, doc: &Document) -> IndexResult<()> {
        for index in &self.collection.indexes {
            self.save_one(index, doc)?;
        }
        Ok(())
    }

    /// Replace entries after a document update.
    pub fn update(&self, old: &Document, new: &Document) -> IndexResult<()> {
        for index in &self.collection.indexes {
            self.delete_one(index, old)?;
            self.save_one(index, new)?;
        }
        Ok(())
    }

    /// Remove entries for a deleted document.
    pub fn delete(&self, doc: &Document) -> IndexResult<()> {
        for index in &self.collection.indexes {
            self.delete_one(index, doc)?;
        }
        Ok(())
    }

    fn save_one(&self, index: &IndexDescription, doc: &Document) -> IndexResult<()> {
        let key = self.entry_key(index, doc)?;
        if index.unique {
            // The value slot carries the document id; an existing entry for
            // a different document is a violation.
            if let Some(existing) = self.txn.data().get(&key.to_bytes())? {
                if existing != doc.doc_id.as_str().as_bytes() {
                    return Err(IndexError::UniqueViolation {
                        index: index.name.clone(),
                    });
                }
            }
            self.txn
                .data()
                .put(&key.to_bytes(), doc.doc_id.as_str().as_bytes())?;
        } else {
            self.txn.data().put(&key.to_bytes(), &[])?;
        }
        debug!(index = %index.name, doc = %doc.doc_id, "index entry saved");
        Ok(())
    }

    fn delete_one(&self, index: &IndexDescription, doc: &Document) -> IndexResult<()> {
        let key = self.entry_key(index, doc)?;
        self.txn.data().delete(&key.to_bytes())?;
        Ok(())
    }

    /// Build the entry key: the encoded indexed field values, with the
    /// document id appended as the final segment for non-unique indexes.
    fn entry_key(&self, index: &IndexDescription, doc: &Document) -> IndexResult<IndexDataStoreKey> {
        let mut values = Vec::with_capacity(index.fields.len() + 1);
        for field in &index.fields {
            let value = doc.get(&field.name).unwrap_or(&FieldValue::Null);
            values.push(encode_field_value(value));
        }
        if !index.unique {
            values.push(doc.doc_id.as_str().as_bytes().to_vec());
        }
        Ok(IndexDataStoreKey::new(
            self.collection.id,
            index.id,
            values,
        ))
    }
}
