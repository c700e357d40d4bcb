//! The lens seam: migrating documents between schema versions on read.
//!
//! The full transform runtime is an external collaborator; the registry
//! trait is its interface. [`DefaultsLens`] is the built-in migration used
//! when no external transform is registered: added fields materialize as
//! null (or a kind default for non-nillable fields), which is exactly the
//! forward migration for append-only schema patches.

use oxbow_types::{Document, FieldValue, SchemaDescription};

use crate::error::DbResult;

/// Translates documents between adjacent schema versions.
pub trait LensRegistry: Send + Sync {
    /// Migrate `doc` from the version described by `from` to `to`.
    fn migrate(
        &self,
        doc: Document,
        from: &SchemaDescription,
        to: &SchemaDescription,
    ) -> DbResult<Document>;
}

/// The built-in forward migration: fill fields the source version lacks.
pub struct DefaultsLens;

impl LensRegistry for DefaultsLens {
    fn migrate(
        &self,
        mut doc: Document,
        from: &SchemaDescription,
        to: &SchemaDescription,
    ) -> DbResult<Document> {
        for field in &to.fields {
            if from.field_by_name(&field.name).is_some() || doc.get(&field.name).is_some() {
                continue;
            }
            let default = if field.nillable {
                FieldValue::Null
            } else {
                kind_default(field.kind)
            };
            doc.set(field.name.clone(), default);
        }
        Ok(doc)
    }
}

fn kind_default(kind: oxbow_types::FieldKind) -> FieldValue {
    use oxbow_types::FieldKind;
    match kind {
        FieldKind::Bool => FieldValue::Bool(false),
        FieldKind::Int => FieldValue::Int(0),
        FieldKind::Float => FieldValue::Float(0.0),
        FieldKind::String => FieldValue::String(String::new()),
        FieldKind::Bytes => FieldValue::Bytes(Vec::new()),
    }
}
