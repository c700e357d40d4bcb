//! Persistence of collection and schema descriptions in the system store.

use oxbow_keys::{
    CollectionKey, CollectionNameKey, CollectionSchemaVersionKey, Key, SchemaRootKey,
    SchemaVersionKey,
};
use oxbow_store::Transaction;
use oxbow_types::{
    CollectionDescription, CollectionId, SchemaDescription, SchemaRoot, SchemaVersionId,
};

use crate::error::{DbError, DbResult};

/// Filters for collection enumeration.
#[derive(Clone, Debug, Default)]
pub struct CollectionFetchOptions {
    pub name: Option<String>,
    pub schema_version_id: Option<SchemaVersionId>,
    pub schema_root: Option<SchemaRoot>,
}

/// Persist a collection description and its secondary index rows.
pub fn save_collection(txn: &Transaction, desc: &CollectionDescription) -> DbResult<()> {
    let bytes = serde_json::to_vec(desc).map_err(|e| DbError::UnmarshalCollection(e.to_string()))?;
    txn.system()
        .put(&CollectionKey::new(desc.id).to_bytes(), &bytes)?;

    if let Some(name) = &desc.name {
        txn.system().put(
            &CollectionNameKey::new(name.clone()).to_bytes(),
            desc.id.to_string().as_bytes(),
        )?;
    }

    // Secondary index: schema version → collection. Superseded rows are
    // preserved deliberately, so historic versions remain discoverable.
    let version_key = CollectionSchemaVersionKey::new(desc.schema_version_id.clone(), desc.id);
    txn.system().put(&version_key.to_bytes(), &[])?;
    Ok(())
}

/// Load a collection description by id.
pub fn collection_by_id(
    txn: &Transaction,
    id: CollectionId,
) -> DbResult<Option<CollectionDescription>> {
    match txn.system().get(&CollectionKey::new(id).to_bytes())? {
        None => Ok(None),
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| DbError::UnmarshalCollection(e.to_string())),
    }
}

/// Load a collection description by name.
pub fn collection_by_name(
    txn: &Transaction,
    name: &str,
) -> DbResult<Option<CollectionDescription>> {
    let id_bytes = txn
        .system()
        .get(&CollectionNameKey::new(name).to_bytes())?;
    let Some(id_bytes) = id_bytes else {
        return Ok(None);
    };
    let id: u32 = String::from_utf8_lossy(&id_bytes)
        .parse()
        .map_err(|_| DbError::UnmarshalCollection("corrupt collection name row".to_string()))?;
    collection_by_id(txn, CollectionId(id))
}

/// Enumerate collection descriptions matching the options.
pub fn collections(
    txn: &Transaction,
    options: &CollectionFetchOptions,
) -> DbResult<Vec<CollectionDescription>> {
    let mut result = Vec::new();
    for (_, bytes) in txn.system().iter_prefix(b"/collection/id/")? {
        let desc: CollectionDescription = serde_json::from_slice(&bytes)
            .map_err(|e| DbError::UnmarshalCollection(e.to_string()))?;
        if let Some(name) = &options.name {
            if desc.name.as_deref() != Some(name.as_str()) {
                continue;
            }
        }
        if let Some(version) = &options.schema_version_id {
            if &desc.schema_version_id != version {
                continue;
            }
        }
        if let Some(root) = &options.schema_root {
            let schema = schema_by_version(txn, &desc.schema_version_id)?
                .ok_or_else(|| DbError::SchemaVersionNotFound(desc.schema_version_id.0.clone()))?;
            if &schema.root != root {
                continue;
            }
        }
        result.push(desc);
    }
    Ok(result)
}

/// Persist an immutable schema version and its root index row.
pub fn save_schema(txn: &Transaction, schema: &SchemaDescription) -> DbResult<()> {
    let bytes =
        serde_json::to_vec(schema).map_err(|e| DbError::UnmarshalCollection(e.to_string()))?;
    txn.system().put(
        &SchemaVersionKey::new(schema.version_id.clone()).to_bytes(),
        &bytes,
    )?;
    // Root → versions index; the key is the row, there is no value.
    let root_key = SchemaRootKey::new(schema.root.clone(), schema.version_id.clone());
    txn.system().put(&root_key.to_bytes(), &[])?;
    Ok(())
}

/// Load a schema by version id.
pub fn schema_by_version(
    txn: &Transaction,
    version_id: &SchemaVersionId,
) -> DbResult<Option<SchemaDescription>> {
    match txn
        .system()
        .get(&SchemaVersionKey::new(version_id.clone()).to_bytes())?
    {
        None => Ok(None),
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| DbError::UnmarshalCollection(e.to_string())),
    }
}

/// All version ids recorded for a schema root, in key order.
pub fn schema_versions_for_root(
    txn: &Transaction,
    root: &SchemaRoot,
) -> DbResult<Vec<SchemaVersionId>> {
    let prefix = SchemaRootKey::prefix(root.clone()).to_bytes();
    let mut versions = Vec::new();
    for (key, _) in txn.system().iter_prefix(&prefix)? {
        let key_str = String::from_utf8_lossy(&key);
        let parsed = SchemaRootKey::parse(&key_str)?;
        if let Some(version) = parsed.schema_version_id {
            versions.push(version);
        }
    }
    Ok(versions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxbow_store::{MemoryRootStore, MultiStore};
    use oxbow_types::{FieldDescription, FieldId, FieldKind};
    use std::sync::Arc;

    fn multistore() -> MultiStore {
        MultiStore::new(Arc::new(MemoryRootStore::new()))
    }

    fn schema() -> SchemaDescription {
        SchemaDescription::new(
            "Users",
            vec![FieldDescription {
                name: "Name".to_string(),
                id: FieldId(1),
                kind: FieldKind::String,
                nillable: true,
            }],
        )
    }

    fn desc(schema: &SchemaDescription) -> CollectionDescription {
        CollectionDescription {
            name: Some("Users".to_string()),
            id: CollectionId(1),
            root_id: CollectionId(1),
            schema_version_id: schema.version_id.clone(),
            sources: Vec::new(),
            indexes: Vec::new(),
            policy: None,
        }
    }

    #[test]
    fn collection_roundtrip_by_id_and_name() {
        let store = multistore();
        let txn = store.new_txn(false);
        let schema = schema();
        let desc = desc(&schema);

        save_schema(&txn, &schema).unwrap();
        save_collection(&txn, &desc).unwrap();
        txn.commit().unwrap();

        let txn = store.new_txn(true);
        assert_eq!(
            collection_by_id(&txn, CollectionId(1)).unwrap().unwrap(),
            desc
        );
        assert_eq!(collection_by_name(&txn, "Users").unwrap().unwrap(), desc);
        assert!(collection_by_name(&txn, "Ghosts").unwrap().is_none());
    }

    #[test]
    fn fetch_options_filter_collections() {
        let store = multistore();
        let txn = store.new_txn(false);
        let schema = schema();
        save_schema(&txn, &schema).unwrap();
        save_collection(&txn, &desc(&schema)).unwrap();
        txn.commit().unwrap();

        let txn = store.new_txn(true);
        let all = collections(&txn, &CollectionFetchOptions::default()).unwrap();
        assert_eq!(all.len(), 1);

        let by_version = collections(
            &txn,
            &CollectionFetchOptions {
                schema_version_id: Some(schema.version_id.clone()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_version.len(), 1);

        let by_root = collections(
            &txn,
            &CollectionFetchOptions {
                schema_root: Some(schema.root.clone()),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(by_root.len(), 1);

        let none = collections(
            &txn,
            &CollectionFetchOptions {
                name: Some("Ghosts".to_string()),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn schema_versions_accumulate_under_the_root() {
        let store = multistore();
        let txn = store.new_txn(false);
        let v1 = schema();
        save_schema(&txn, &v1).unwrap();

        let mut fields = v1.fields.clone();
        fields.push(FieldDescription {
            name: "Age".to_string(),
            id: FieldId(2),
            kind: FieldKind::Int,
            nillable: true,
        });
        let v2 = v1.next_version(fields);
        save_schema(&txn, &v2).unwrap();
        txn.commit().unwrap();

        let txn = store.new_txn(true);
        let versions = schema_versions_for_root(&txn, &v1.root).unwrap();
        assert_eq!(versions.len(), 2);
        assert!(versions.contains(&v1.version_id));
        assert!(versions.contains(&v2.version_id));
    }
}
