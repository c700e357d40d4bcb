//! Foundation types for the Oxbow document database.
//!
//! This crate provides the identity, value, and description types used
//! throughout the Oxbow system. Every other Oxbow crate depends on
//! `oxbow-types`.
//!
//! # Key Types
//!
//! - [`DocId`] — Content-addressed document identifier (CIDv1, SHA-256)
//! - [`FieldId`] / [`CollectionId`] — Numeric identifiers used in storage keys
//! - [`SchemaVersionId`] / [`SchemaRoot`] — Content-hash schema identifiers
//! - [`FieldValue`] — A typed document field value with DAG-CBOR encoding
//! - [`CollectionDescription`] — Collection metadata persisted in the system store
//! - [`ActorIdentity`] — The identity performing gated operations

pub mod block_cid;
pub mod description;
pub mod document;
pub mod error;
pub mod id;
pub mod identity;
pub mod schema;
pub mod value;

pub use block_cid::{new_cid_dagpb, new_cid_raw};
pub use description::{
    CollectionDescription, CollectionSource, IndexDescription, IndexedFieldDescription,
    PolicyDescription, QuerySource, Source,
};
pub use document::Document;
pub use error::TypeError;
pub use id::{CollectionId, DocId, FieldId, SchemaRoot, SchemaVersionId, COMPOSITE_NAMESPACE};
pub use identity::ActorIdentity;
pub use schema::{FieldDescription, FieldKind, SchemaDescription};
pub use value::FieldValue;
