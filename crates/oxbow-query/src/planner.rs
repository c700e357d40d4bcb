use oxbow_index::{DocumentFetcher, IndexFetcher};
use oxbow_store::Transaction;
use oxbow_types::{CollectionDescription, Document, FieldValue, IndexDescription};
use tracing::debug;

use crate::error::QueryResult;
use crate::filter::Filter;

/// Full enumeration of a collection's live documents, implemented by the
/// document store layer.
pub trait ScanSource {
    fn scan_all(&self) -> QueryResult<Vec<Document>>;
}

/// The chosen access path for a query.
#[derive(Debug, PartialEq)]
pub enum Plan<'a> {
    /// Probe an index with an equality value, then re-filter.
    IndexScan {
        index: &'a IndexDescription,
        value: FieldValue,
    },
    /// Read every live document, then filter.
    FullScan,
}

/// Select the access path: an `_eq` condition on the leading field of some
/// index wins; anything else scans.
pub fn plan<'a>(
    collection: &'a CollectionDescription,
    filter: Option<&Filter>,
) -> Plan<'a> {
    if let Some((field, value)) = filter.and_then(|f| f.leading_eq()) {
        if let Some(index) = collection.indexes_on_field(field).into_iter().next() {
            return Plan::IndexScan {
                index,
                value: value.clone(),
            };
        }
    }
    Plan::FullScan
}

/// Execute a query: plan, fetch, and apply the full filter to the results.
pub fn execute<S>(
    txn: &Transaction,
    collection: &CollectionDescription,
    filter: Option<&Filter>,
    source: &S,
) -> QueryResult<Vec<Document>>
where
    S: ScanSource + DocumentFetcher,
{
    let candidates = match plan(collection, filter) {
        Plan::IndexScan { index, value } => {
            debug!(index = %index.name, "query using index scan");
            let fetcher = IndexFetcher::new(txn, collection, index, source);
            fetcher.fetch_eq(&value)?
        }
        Plan::FullScan => {
            debug!(collection = ?collection.name, "query using full scan");
            source.scan_all()?
        }
    };

    Ok(candidates
        .into_iter()
        .filter(|doc| filter.map(|f| f.matches(doc)).unwrap_or(true))
        .collect())
}
