//! Policy-based access control for the Oxbow document database.
//!
//! Policies are YAML (or JSON) documents naming resources, relations, and
//! permission expressions. A registered policy is addressed by its
//! deterministic content hash. Documents are bound to their creating actor
//! through [`AcpProvider::register_doc_object`]; every gated read and write
//! consults [`AcpProvider::check_doc_access`].
//!
//! Two providers implement the interface: [`InMemoryAcp`] (ephemeral) and
//! [`PersistentAcp`] (state survives restarts against the same path).

pub mod error;
mod local;
pub mod policy;
pub mod provider;

pub use error::{AcpError, AcpResult};
pub use local::{InMemoryAcp, PersistentAcp};
pub use policy::{Policy, PolicyResource};
pub use provider::{AcpProvider, DocPermission};
