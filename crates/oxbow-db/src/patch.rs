//! Schema patching.
//!
//! A patch is a JSON-patch document over the schema's field list. Only
//! morphism-preserving patches are accepted: fields may be appended, never
//! removed, and a field's kind never changes.

use serde::Deserialize;

use oxbow_types::{FieldDescription, FieldKind, SchemaDescription};

use crate::error::{DbError, DbResult};

#[derive(Debug, Deserialize)]
struct PatchOp {
    op: String,
    path: String,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct NewField {
    name: String,
    kind: FieldKind,
    #[serde(default)]
    nillable: bool,
}

/// Apply a JSON-patch to a schema's fields, returning the new field list.
pub fn apply_patch(schema: &SchemaDescription, patch: &str) -> DbResult<Vec<FieldDescription>> {
    let ops: Vec<PatchOp> =
        serde_json::from_str(patch).map_err(|e| DbError::InvalidPatch(e.to_string()))?;
    if ops.is_empty() {
        return Err(DbError::InvalidPatch("patch is empty".to_string()));
    }

    let mut fields = schema.fields.clone();
    let mut next_id = schema.next_field_id();

    for op in ops {
        match op.op.as_str() {
            "add" => {
                if op.path != "/fields/-" {
                    return Err(DbError::InvalidPatch(format!(
                        "unsupported add path {:?}",
                        op.path
                    )));
                }
                let value = op
                    .value
                    .ok_or_else(|| DbError::InvalidPatch("add without value".to_string()))?;
                let new_field: NewField = serde_json::from_value(value)
                    .map_err(|e| DbError::InvalidPatch(e.to_string()))?;
                if fields.iter().any(|f| f.name == new_field.name) {
                    return Err(DbError::InvalidPatch(format!(
                        "field {} already exists",
                        new_field.name
                    )));
                }
                fields.push(FieldDescription {
                    name: new_field.name,
                    id: next_id,
                    kind: new_field.kind,
                    nillable: new_field.nillable,
                });
                next_id = oxbow_types::FieldId(next_id.0 + 1);
            }
            "remove" => {
                return Err(DbError::InvalidPatch(
                    "field removals are not allowed".to_string(),
                ));
            }
            "replace" => {
                // The only mutable field attribute is nillability widening;
                // kind changes are type regressions and rejected outright.
                return Err(DbError::InvalidPatch(
                    "field replacement is not allowed".to_string(),
                ));
            }
            other => {
                return Err(DbError::InvalidPatch(format!("unknown op {other:?}")));
            }
        }
    }

    Ok(fields)
}

/// Check that `next` is a valid morphism from `previous`: all previous
/// fields survive with the same id and kind.
pub fn validate_morphism(
    previous: &SchemaDescription,
    next_fields: &[FieldDescription],
) -> DbResult<()> {
    for field in &previous.fields {
        let Some(successor) = next_fields.iter().find(|f| f.id == field.id) else {
            return Err(DbError::InvalidPatch(format!(
                "field {} was removed",
                field.name
            )));
        };
        if successor.kind != field.kind {
            return Err(DbError::InvalidPatch(format!(
                "field {} changed kind from {} to {}",
                field.name, field.kind, successor.kind
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_types::FieldId;

    fn schema() -> SchemaDescription {
        SchemaDescription::new(
            "Users",
            vec![FieldDescription {
                name: "Name".to_string(),
                id: FieldId(1),
                kind: FieldKind::String,
                nillable: false,
            }],
        )
    }

    #[test]
    fn add_field_appends_with_next_id() {
        let schema = schema();
        let fields = apply_patch(
            &schema,
            r#"[{"op": "add", "path": "/fields/-", "value": {"name": "Age", "kind": "int", "nillable": true}}]"#,
        )
        .unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[1].name, "Age");
        assert_eq!(fields[1].id, FieldId(2));
        assert_eq!(fields[1].kind, FieldKind::Int);
        validate_morphism(&schema, &fields).unwrap();
    }

    #[test]
    fn remove_is_rejected() {
        let err = apply_patch(
            &schema(),
            r#"[{"op": "remove", "path": "/fields/0"}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::InvalidPatch(_)));
    }

    #[test]
    fn replace_is_rejected() {
        let err = apply_patch(
            &schema(),
            r#"[{"op": "replace", "path": "/fields/0", "value": {"name": "Name", "kind": "int"}}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::InvalidPatch(_)));
    }

    #[test]
    fn duplicate_field_is_rejected() {
        let err = apply_patch(
            &schema(),
            r#"[{"op": "add", "path": "/fields/-", "value": {"name": "Name", "kind": "string"}}]"#,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::InvalidPatch(_)));
    }

    #[test]
    fn empty_patch_is_rejected() {
        assert!(apply_patch(&schema(), "[]").is_err());
        assert!(apply_patch(&schema(), "not json").is_err());
    }

    #[test]
    fn morphism_rejects_removals_and_kind_changes() {
        let schema = schema();
        assert!(validate_morphism(&schema, &[]).is_err());

        let mut changed = schema.fields.clone();
        changed[0].kind = FieldKind::Int;
        assert!(validate_morphism(&schema, &changed).is_err());
    }
}
