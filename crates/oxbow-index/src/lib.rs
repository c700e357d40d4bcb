//! Secondary indexes for the Oxbow document database.
//!
//! Indexes are ordered key scans over the main store, maintained
//! synchronously with document writes inside the same transaction; there is
//! no asynchronous backfill path. Unique indexes store the document id in
//! the entry value; non-unique indexes append it as the last key segment.

pub mod encoding;
pub mod error;
pub mod fetcher;
pub mod maintenance;

pub use encoding::{decode_field_value, encode_field_value, NIL_SENTINEL};
pub use error::{IndexError, IndexResult};
pub use fetcher::{DocumentFetcher, IndexFetcher};
pub use maintenance::IndexManager;
