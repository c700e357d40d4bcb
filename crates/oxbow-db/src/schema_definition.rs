//! The schema definition accepted by `add_schema`.
//!
//! Definitions arrive from the outer request layer already tokenized into a
//! type name, fields, and directives. A compact text form is also accepted:
//!
//! ```text
//! type Users @policy(id: "<policyID>", resource: "users") {
//!     Name: String @index
//!     Age: Int
//!     HeightM: Float
//! }
//! ```
//!
//! `@policy` binds the collection to an access control resource (both
//! arguments are required); `@index` declares a secondary index on a field.

use oxbow_types::FieldKind;

use crate::error::{DbError, DbResult};

/// One field of a schema definition.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefinition {
    pub name: String,
    pub kind: FieldKind,
    pub nillable: bool,
    pub indexed: bool,
}

/// A parsed schema definition, ready for `add_schema`.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaDefinition {
    pub name: String,
    pub fields: Vec<FieldDefinition>,
    /// `@policy(id, resource)` binding, when present.
    pub policy: Option<(String, String)>,
}

impl SchemaDefinition {
    /// Parse the compact text form.
    pub fn parse(input: &str) -> DbResult<Self> {
        let input = input.trim();
        let rest = input
            .strip_prefix("type ")
            .ok_or_else(|| DbError::InvalidSchemaDefinition("expected `type`".to_string()))?;

        let open = rest
            .find('{')
            .ok_or_else(|| DbError::InvalidSchemaDefinition("expected `{`".to_string()))?;
        let close = rest
            .rfind('}')
            .ok_or_else(|| DbError::InvalidSchemaDefinition("expected `}`".to_string()))?;
        let header = rest[..open].trim();
        let body = &rest[open + 1..close];

        let (name, policy) = parse_header(header)?;
        if name.is_empty() {
            return Err(DbError::InvalidSchemaDefinition(
                "type name is empty".to_string(),
            ));
        }

        let mut fields = Vec::new();
        for line in body.lines() {
            let line = line.trim().trim_end_matches(',');
            if line.is_empty() {
                continue;
            }
            fields.push(parse_field(line)?);
        }
        if fields.is_empty() {
            return Err(DbError::InvalidSchemaDefinition(format!(
                "type {name} declares no fields"
            )));
        }

        Ok(Self {
            name,
            fields,
            policy,
        })
    }
}

fn parse_header(header: &str) -> DbResult<(String, Option<(String, String)>)> {
    match header.split_once('@') {
        None => Ok((header.trim().to_string(), None)),
        Some((name, directive)) => {
            let directive = directive.trim();
            let args = directive
                .strip_prefix("policy(")
                .and_then(|d| d.strip_suffix(')'))
                .ok_or_else(|| {
                    DbError::InvalidSchemaDefinition(format!(
                        "unknown type directive @{directive}"
                    ))
                })?;

            let mut id = None;
            let mut resource = None;
            for arg in args.split(',') {
                let (key, value) = arg.split_once(':').ok_or_else(|| {
                    DbError::InvalidSchemaDefinition("malformed @policy argument".to_string())
                })?;
                let value = value.trim().trim_matches('"').to_string();
                match key.trim() {
                    "id" => id = Some(value),
                    "resource" => resource = Some(value),
                    other => {
                        return Err(DbError::InvalidSchemaDefinition(format!(
                            "unknown @policy argument {other}"
                        )))
                    }
                }
            }

            // Both arguments are required; empty values reject the schema.
            let id = id.filter(|v| !v.is_empty()).ok_or(DbError::PolicyIdEmpty)?;
            let resource = resource
                .filter(|v| !v.is_empty())
                .ok_or(DbError::PolicyResourceEmpty)?;
            Ok((name.trim().to_string(), Some((id, resource))))
        }
    }
}

fn parse_field(line: &str) -> DbResult<FieldDefinition> {
    let (name, rest) = line.split_once(':').ok_or_else(|| {
        DbError::InvalidSchemaDefinition(format!("malformed field {line:?}"))
    })?;
    let rest = rest.trim();
    let indexed = rest.contains("@index");
    let kind_token = rest
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .trim_end_matches('!');
    let nillable = !rest.split_whitespace().next().unwrap_or_default().ends_with('!');

    let kind = match kind_token {
        "Boolean" => FieldKind::Bool,
        "Int" => FieldKind::Int,
        "Float" => FieldKind::Float,
        "String" => FieldKind::String,
        "Bytes" => FieldKind::Bytes,
        other => {
            return Err(DbError::InvalidSchemaDefinition(format!(
                "unknown field kind {other:?}"
            )))
        }
    };

    Ok(FieldDefinition {
        name: name.trim().to_string(),
        kind,
        nillable,
        indexed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_type() {
        let schema = SchemaDefinition::parse(
            "type Users {\n    Name: String\n    Age: Int\n    HeightM: Float\n}",
        )
        .unwrap();
        assert_eq!(schema.name, "Users");
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.fields[0].kind, FieldKind::String);
        assert_eq!(schema.fields[1].kind, FieldKind::Int);
        assert!(schema.policy.is_none());
    }

    #[test]
    fn parse_policy_directive() {
        let schema = SchemaDefinition::parse(
            "type Users @policy(id: \"abc123\", resource: \"users\") {\n    Name: String\n}",
        )
        .unwrap();
        assert_eq!(
            schema.policy,
            Some(("abc123".to_string(), "users".to_string()))
        );
    }

    #[test]
    fn missing_policy_id_is_rejected() {
        let err = SchemaDefinition::parse(
            "type Users @policy(resource: \"users\") {\n    Name: String\n}",
        )
        .unwrap_err();
        assert!(matches!(err, DbError::PolicyIdEmpty));

        let err = SchemaDefinition::parse(
            "type Users @policy(id: \"\", resource: \"users\") {\n    Name: String\n}",
        )
        .unwrap_err();
        assert!(matches!(err, DbError::PolicyIdEmpty));
    }

    #[test]
    fn missing_policy_resource_is_rejected() {
        let err = SchemaDefinition::parse(
            "type Users @policy(id: \"abc\") {\n    Name: String\n}",
        )
        .unwrap_err();
        assert!(matches!(err, DbError::PolicyResourceEmpty));
    }

    #[test]
    fn parse_index_directive() {
        let schema =
            SchemaDefinition::parse("type Users {\n    Name: String @index\n    Age: Int\n}")
                .unwrap();
        assert!(schema.fields[0].indexed);
        assert!(!schema.fields[1].indexed);
    }

    #[test]
    fn non_null_marker_clears_nillable() {
        let schema =
            SchemaDefinition::parse("type Users {\n    Name: String!\n    Age: Int\n}").unwrap();
        assert!(!schema.fields[0].nillable);
        assert!(schema.fields[1].nillable);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(SchemaDefinition::parse("Users { Name: String }").is_err());
        assert!(SchemaDefinition::parse("type Users").is_err());
        assert!(SchemaDefinition::parse("type Users {}").is_err());
        assert!(SchemaDefinition::parse("type Users {\n    Name: Uuid\n}").is_err());
    }
}
