//! The index fetcher: answers point queries from index entries, falling back
//! to the wrapped document fetcher for non-indexed fields.

use oxbow_keys::{IndexDataStoreKey, Key};
use oxbow_store::Transaction;
use oxbow_types::{CollectionDescription, DocId, Document, FieldValue, IndexDescription};

use crate::encoding::{decode_field_value, encode_field_value};
use crate::error::{IndexError, IndexResult};

/// Point lookup of full documents by id, implemented by the document store
/// layer. Returns `Ok(None)` for missing or tombstoned documents.
pub trait DocumentFetcher {
    fn fetch(&self, doc_id: &DocId) -> IndexResult<Option<Document>>;
}

/// Iterates an index key space and materializes matching documents.
///
/// The fetcher decodes index entries into partial documents (the indexed
/// fields only); when the caller needs the remaining fields it issues a point
/// lookup through the wrapped [`DocumentFetcher`] using the extracted
/// document id.
pub struct IndexFetcher<'a, F> {
    txn: &'a Transaction,
    collection: &'a CollectionDescription,
    index: &'a IndexDescription,
    doc_fetcher: &'a F,
}

impl<'a, F: DocumentFetcher> IndexFetcher<'a, F> {
    pub fn new(
        txn: &'a Transaction,
        collection: &'a CollectionDescription,
        index: &'a IndexDescription,
        doc_fetcher: &'a F,
    ) -> Self {
        Self {
            txn,
            collection,
            index,
            doc_fetcher,
        }
    }

    /// Fetch all documents whose leading indexed field equals `value`.
    pub fn fetch_eq(&self, value: &FieldValue) -> IndexResult<Vec<Document>> {
        if self.index.unique {
            self.fetch_eq_unique(value)
        } else {
            self.fetch_eq_non_unique(value)
        }
    }

    fn fetch_eq_unique(&self, value: &FieldValue) -> IndexResult<Vec<Document>> {
        // Unique entries store the document id in the value. A single-field
        // index is one exact-key read; a multi-field index scans under the
        // leading value, with the separator pinning the value boundary.
        let key = IndexDataStoreKey::new(
            self.collection.id,
            self.index.id,
            vec![encode_field_value(value)],
        );
        if self.index.fields.len() == 1 {
            return match self.txn.data().get(&key.to_bytes())? {
                None => Ok(Vec::new()),
                Some(doc_id_bytes) => {
                    let doc_id = parse_doc_id(&doc_id_bytes)?;
                    Ok(self.materialize(&doc_id, value)?.into_iter().collect())
                }
            };
        }

        let mut prefix = key.to_bytes();
        prefix.push(b'/');
        let mut documents = Vec::new();
        for (_, doc_id_bytes) in self.txn.data().iter_prefix(&prefix)? {
            let doc_id = parse_doc_id(&doc_id_bytes)?;
            if let Some(doc) = self.materialize(&doc_id, value)? {
                documents.push(doc);
            }
        }
        Ok(documents)
    }

    fn fetch_eq_non_unique(&self, value: &FieldValue) -> IndexResult<Vec<Document>> {
        // Non-unique entries append the document id as the last key segment;
        // the trailing separator pins the value boundary so one encoding is
        // never read as a prefix of another.
        let mut prefix = IndexDataStoreKey::new(
            self.collection.id,
            self.index.id,
            vec![encode_field_value(value)],
        )
        .to_bytes();
        prefix.push(b'/');

        let mut documents = Vec::new();
        for (key, _) in self.txn.data().iter_prefix(&prefix)? {
            let doc_id_bytes = key
                .rsplit(|&b| b == b'/')
                .next()
                .ok_or_else(|| IndexError::InvalidEntry(format!("{key:?}")))?;
            let doc_id = parse_doc_id(doc_id_bytes)?;
            if let Some(doc) = self.materialize(&doc_id, value)? {
                documents.push(doc);
            }
        }
        Ok(documents)
    }

    /// Produce the full document via the wrapped fetcher, or a partial
    /// document carrying only the indexed field when the lookup comes back
    /// empty.
    fn materialize(&self, doc_id: &DocId, value: &FieldValue) -> IndexResult<Option<Document>> {
        if let Some(doc) = self.doc_fetcher.fetch(doc_id)? {
            if doc.deleted {
                return Ok(None);
            }
            return Ok(Some(doc));
        }
        let mut partial = Document::new(doc_id.clone());
        if let Some(field) = self.index.fields.first() {
            partial.set(field.name.clone(), value.clone());
        }
        Ok(Some(partial))
    }

    /// Decode the indexed field values out of a raw entry key.
    pub fn decode_entry_values(&self, key: &[u8]) -> IndexResult<Vec<FieldValue>> {
        let segments: Vec<&[u8]> = key.split(|&b| b == b'/').skip(3).collect();
        let value_count = if self.index.unique {
            segments.len()
        } else {
            segments.len().saturating_sub(1)
        };
        segments
            .iter()
            .take(value_count)
            .map(|segment| decode_field_value(segment))
            .collect()
    }
}

fn parse_doc_id(bytes: &[u8]) -> IndexResult<DocId> {
    let s = std::str::from_utf8(bytes)
        .map_err(|_| IndexError::InvalidEntry(format!("{bytes:?}")))?;
    DocId::parse(s).map_err(|e| IndexError::InvalidEntry(e.to_string()))
}
