//! The document fetcher: materializes documents from the data store.

use oxbow_keys::{DataStoreKey, Key, PrimaryDataStoreKey};
use oxbow_store::Transaction;
use oxbow_types::{
    CollectionDescription, DocId, Document, FieldValue, SchemaDescription,
};

use crate::error::{DbError, DbResult};

/// Reads documents of one collection within one transaction.
///
/// Field values live under `/<root>/v/<docID>/<fieldID>`; the fetcher maps
/// field ids back to names through the schema and flags tombstoned documents
/// via the `d` instance key.
pub struct CollectionFetcher<'a> {
    txn: &'a Transaction,
    collection: &'a CollectionDescription,
    schema: &'a SchemaDescription,
}

impl<'a> CollectionFetcher<'a> {
    pub fn new(
        txn: &'a Transaction,
        collection: &'a CollectionDescription,
        schema: &'a SchemaDescription,
    ) -> Self {
        Self {
            txn,
            collection,
            schema,
        }
    }

    /// Materialize a document. Returns `None` if it was never created;
    /// tombstoned documents come back with `deleted` set.
    pub fn fetch(&self, doc_id: &DocId) -> DbResult<Option<Document>> {
        let primary = PrimaryDataStoreKey::new(self.collection.root_id, doc_id);
        if !self.txn.data().has(&primary.to_bytes())? {
            return Ok(None);
        }

        let mut doc = Document::new(doc_id.clone());

        let deleted_key = DataStoreKey::new(self.collection.root_id)
            .with_deleted_flag()
            .with_doc_id(doc_id);
        doc.deleted = self.txn.data().has(&deleted_key.to_bytes())?;

        let mut prefix = DataStoreKey::new(self.collection.root_id)
            .with_value_flag()
            .with_doc_id(doc_id)
            .to_bytes();
        prefix.push(b'/');

        for (key, value) in self.txn.data().iter_prefix(&prefix)? {
            let key_str = String::from_utf8_lossy(&key);
            let parsed = DataStoreKey::parse(&key_str)?;
            let field_id = parsed.field_id_number()?;
            let Some(field) = self.schema.field_by_id(oxbow_types::FieldId(field_id)) else {
                // Written under a newer schema version than we hold; skipped
                // here, surfaced after a lens migration on the reader's side.
                continue;
            };
            doc.set(field.name.clone(), FieldValue::from_cbor(&value)?);
        }

        Ok(Some(doc))
    }

    /// All document ids ever created in the collection, including tombstoned
    /// ones. Used by replicator catch-up, which must ship every DAG.
    pub fn all_doc_ids(&self) -> DbResult<Vec<DocId>> {
        let prefix = format!("/{}/pk/", self.collection.root_id);
        let mut ids = Vec::new();
        for (key, _) in self.txn.data().iter_prefix(prefix.as_bytes())? {
            let key_str = String::from_utf8_lossy(&key);
            let parsed = PrimaryDataStoreKey::parse(&key_str)?;
            ids.push(
                DocId::parse(&parsed.doc_id).map_err(|e| DbError::Type(e))?,
            );
        }
        Ok(ids)
    }

    /// All live (non-tombstoned) documents.
    pub fn scan_all(&self) -> DbResult<Vec<Document>> {
        let mut docs = Vec::new();
        for doc_id in self.all_doc_ids()? {
            if let Some(doc) = self.fetch(&doc_id)? {
                if !doc.deleted {
                    docs.push(doc);
                }
            }
        }
        Ok(docs)
    }
}

impl oxbow_index::DocumentFetcher for CollectionFetcher<'_> {
    fn fetch(&self, doc_id: &DocId) -> oxbow_index::IndexResult<Option<Document>> {
        CollectionFetcher::fetch(self, doc_id)
            .map_err(|e| oxbow_index::IndexError::Fetch(e.to_string()))
    }
}

impl oxbow_query::ScanSource for CollectionFetcher<'_> {
    fn scan_all(&self) -> oxbow_query::QueryResult<Vec<Document>> {
        CollectionFetcher::scan_all(self).map_err(|e| oxbow_query::QueryError::Scan(e.to_string()))
    }
}
