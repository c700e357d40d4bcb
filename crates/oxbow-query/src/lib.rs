//! Typed query filters and the scan planner.
//!
//! Filters are trees of per-field conditions (`_eq`, `_le`, `_in`, ...)
//! joined by `_and`/`_or`. The planner inspects a collection's indexes: an
//! equality condition on the leading field of an index turns into an index
//! scan through [`oxbow_index::IndexFetcher`]; everything else falls back to
//! a full collection scan. The residual filter is always re-applied to the
//! fetched documents, so plans never change results, only cost.

pub mod error;
pub mod filter;
pub mod planner;

pub use error::{QueryError, QueryResult};
pub use filter::{FieldCondition, Filter, FilterOp};
pub use planner::{execute, plan, Plan, ScanSource};
