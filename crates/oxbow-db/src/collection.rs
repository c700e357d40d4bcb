use std::collections::BTreeMap;

use cid::Cid;
use tracing::debug;

use oxbow_acp::DocPermission;
use oxbow_crdt::{CompositeDelta, Delta, DocStatus, LwwRegDelta, MerkleClock};
use oxbow_keys::{Key, PrimaryDataStoreKey};
use oxbow_index::IndexManager;
use oxbow_query::Filter;
use oxbow_store::Transaction;
use oxbow_types::{
    ActorIdentity, CollectionDescription, DocId, Document, FieldValue, SchemaDescription, Source,
};

use crate::db::Db;
use crate::descriptions;
use crate::error::{DbError, DbResult};
use crate::events::Update;
use crate::fetcher::CollectionFetcher;

/// A handle to one collection.
///
/// The handle is thin: it owns the description and schema snapshot but not
/// the store. Implicit-flavor methods create, commit, and retry their own
/// transaction; `*_with_txn` variants compose into a caller transaction and
/// return the [`Update`] event for the caller to publish after commit.
pub struct Collection<'a> {
    db: &'a Db,
    desc: CollectionDescription,
    schema: SchemaDescription,
}

impl<'a> Collection<'a> {
    pub(crate) fn new(db: &'a Db, desc: CollectionDescription, schema: SchemaDescription) -> Self {
        Self { db, desc, schema }
    }

    pub fn description(&self) -> &CollectionDescription {
        &self.desc
    }

    pub fn schema(&self) -> &SchemaDescription {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.desc.name.as_deref().unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Create
    // -----------------------------------------------------------------------

    /// Create a document from its initial field values.
    pub fn create(
        &self,
        identity: Option<&ActorIdentity>,
        fields: BTreeMap<String, FieldValue>,
    ) -> DbResult<DocId> {
        let (doc_id, update) = self
            .db
            .retry(|txn| self.create_with_txn(txn, identity, fields.clone()))?;
        self.db.events().publish(update);
        Ok(doc_id)
    }

    /// Create within the caller's transaction.
    pub fn create_with_txn(
        &self,
        txn: &Transaction,
        identity: Option<&ActorIdentity>,
        fields: BTreeMap<String, FieldValue>,
    ) -> DbResult<(DocId, Update)> {
        self.validate_fields(&fields)?;
        let identity = self.require_identity(identity)?;

        let doc_id = Document::generate_id(&fields, &self.schema.root)?;
        let primary = PrimaryDataStoreKey::new(self.desc.root_id, &doc_id);
        if txn.data().has(&primary.to_bytes())? {
            return Err(DbError::DocumentAlreadyExists);
        }

        let update = self.write_deltas(txn, &doc_id, &fields, DocStatus::Active)?;
        txn.data().put(&primary.to_bytes(), &[])?;

        let mut doc = Document::new(doc_id.clone());
        doc.fields = fields;
        IndexManager::new(txn, &self.desc).save(&doc)?;

        // Gated collections bind the new document to its creator before the
        // write is visible anywhere.
        if let (Some(policy), Some(identity)) = (&self.desc.policy, identity) {
            self.db
                .acp()
                .ok_or(DbError::AcpNotConfigured)?
                .register_doc_object(identity, &policy.id, &policy.resource, doc_id.as_str())?;
        }

        debug!(collection = self.name(), doc = %doc_id, "document created");
        Ok((doc_id, update))
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    /// Apply field changes to an existing document.
    pub fn update(
        &self,
        identity: Option<&ActorIdentity>,
        doc_id: &DocId,
        changes: BTreeMap<String, FieldValue>,
    ) -> DbResult<()> {
        let update = self
            .db
            .retry(|txn| self.update_with_txn(txn, identity, doc_id, changes.clone()))?;
        self.db.events().publish(update);
        Ok(())
    }

    /// Update within the caller's transaction.
    pub fn update_with_txn(
        &self,
        txn: &Transaction,
        identity: Option<&ActorIdentity>,
        doc_id: &DocId,
        changes: BTreeMap<String, FieldValue>,
    ) -> DbResult<Update> {
        self.validate_fields(&changes)?;
        let identity = self.require_identity(identity)?;
        self.check_write_access(identity, doc_id)?;

        let fetcher = CollectionFetcher::new(txn, &self.desc, &self.schema);
        let old = fetcher.fetch(doc_id)?.ok_or(DbError::DocumentNotFound)?;
        if old.deleted {
            return Err(DbError::DocumentDeleted);
        }

        let update = self.write_deltas(txn, doc_id, &changes, DocStatus::Active)?;

        let mut new = old.clone();
        for (name, value) in changes {
            new.set(name, value);
        }
        IndexManager::new(txn, &self.desc).update(&old, &new)?;

        debug!(collection = self.name(), doc = %doc_id, "document updated");
        Ok(update)
    }

    // -----------------------------------------------------------------------
    // Delete (tombstone)
    // -----------------------------------------------------------------------

    /// Soft-delete a document. The DAG and its blocks remain; the document
    /// is tombstoned and disappears from reads and queries.
    pub fn delete(&self, identity: Option<&ActorIdentity>, doc_id: &DocId) -> DbResult<()> {
        let update = self
            .db
            .retry(|txn| self.delete_with_txn(txn, identity, doc_id))?;
        self.db.events().publish(update);
        Ok(())
    }

    /// Delete within the caller's transaction.
    pub fn delete_with_txn(
        &self,
        txn: &Transaction,
        identity: Option<&ActorIdentity>,
        doc_id: &DocId,
    ) -> DbResult<Update> {
        let identity = self.require_identity(identity)?;
        self.check_write_access(identity, doc_id)?;

        let fetcher = CollectionFetcher::new(txn, &self.desc, &self.schema);
        let old = fetcher.fetch(doc_id)?.ok_or(DbError::DocumentNotFound)?;
        if old.deleted {
            return Err(DbError::DocumentDeleted);
        }

        let update = self.write_deltas(txn, doc_id, &BTreeMap::new(), DocStatus::Deleted)?;
        IndexManager::new(txn, &self.desc).delete(&old)?;

        debug!(collection = self.name(), doc = %doc_id, "document deleted");
        Ok(update)
    }

    // -----------------------------------------------------------------------
    // Read
    // -----------------------------------------------------------------------

    /// Fetch a document. Access denials and tombstones both read as
    /// not-found, so existence never leaks through the gate.
    pub fn get(&self, identity: Option<&ActorIdentity>, doc_id: &DocId) -> DbResult<Document> {
        let txn = self.db.new_txn(true);
        self.get_with_txn(&txn, identity, doc_id)
    }

    /// Fetch within the caller's transaction.
    pub fn get_with_txn(
        &self,
        txn: &Transaction,
        identity: Option<&ActorIdentity>,
        doc_id: &DocId,
    ) -> DbResult<Document> {
        if !self.read_allowed(identity, doc_id)? {
            return Err(DbError::DocumentNotFound);
        }
        let fetcher = CollectionFetcher::new(txn, &self.desc, &self.schema);
        let doc = fetcher.fetch(doc_id)?.ok_or(DbError::DocumentNotFound)?;
        if doc.deleted {
            return Err(DbError::DocumentNotFound);
        }
        self.migrate_to_current(doc)
    }

    /// Every document id in the collection, tombstoned included. Replicator
    /// catch-up must ship every DAG, not just live documents.
    pub fn all_doc_ids(&self) -> DbResult<Vec<DocId>> {
        let txn = self.db.new_txn(true);
        CollectionFetcher::new(&txn, &self.desc, &self.schema).all_doc_ids()
    }

    /// Run a filtered query, dropping documents the actor may not read.
    pub fn query(
        &self,
        identity: Option<&ActorIdentity>,
        filter: Option<&Filter>,
    ) -> DbResult<Vec<Document>> {
        let txn = self.db.new_txn(true);
        let fetcher = CollectionFetcher::new(&txn, &self.desc, &self.schema);
        let results = oxbow_query::execute(&txn, &self.desc, filter, &fetcher)?;

        let mut visible = Vec::with_capacity(results.len());
        for doc in results {
            if self.read_allowed(identity, &doc.doc_id)? {
                visible.push(self.migrate_to_current(doc)?);
            }
        }
        Ok(visible)
    }

    /// Materialize a view collection by running its sources.
    pub fn materialize(&self, identity: Option<&ActorIdentity>) -> DbResult<Vec<Document>> {
        let mut docs = Vec::new();
        for source in &self.desc.sources {
            match source {
                Source::Collection(src) => {
                    let txn = self.db.new_txn(true);
                    let desc = descriptions::collection_by_id(&txn, src.source_collection_id)?
                        .ok_or_else(|| {
                            DbError::CollectionNotFound(src.source_collection_id.to_string())
                        })?;
                    let schema =
                        descriptions::schema_by_version(&txn, &desc.schema_version_id)?
                            .ok_or_else(|| {
                                DbError::SchemaVersionNotFound(
                                    desc.schema_version_id.0.clone(),
                                )
                            })?;
                    drop(txn);
                    let source_collection = Collection::new(self.db, desc, schema);
                    docs.extend(source_collection.query(identity, None)?);
                }
                Source::Query(src) => {
                    // The stored query names the backing collection; the
                    // full query language runs in the outer request layer.
                    let source_collection = self.db.collection(&src.query)?;
                    docs.extend(source_collection.query(identity, None)?);
                }
            }
        }
        Ok(docs)
    }

    // -----------------------------------------------------------------------
    // Heads and blocks (used by the sync peer)
    // -----------------------------------------------------------------------

    /// Current composite heads of a document.
    pub fn composite_heads(&self, doc_id: &DocId) -> DbResult<(Vec<Cid>, u64)> {
        let txn = self.db.new_txn(true);
        let clock = MerkleClock::new(&txn, self.desc.root_id, doc_id);
        Ok(clock.heads(oxbow_types::COMPOSITE_NAMESPACE)?)
    }

    /// Fetch a stored delta block.
    pub fn get_block(&self, doc_id: &DocId, cid: &Cid) -> DbResult<Option<Vec<u8>>> {
        let txn = self.db.new_txn(true);
        let clock = MerkleClock::new(&txn, self.desc.root_id, doc_id);
        Ok(clock.get_block(cid)?)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Write per-field register deltas plus the composite document delta,
    /// returning the update event for the composite block.
    fn write_deltas(
        &self,
        txn: &Transaction,
        doc_id: &DocId,
        fields: &BTreeMap<String, FieldValue>,
        status: DocStatus,
    ) -> DbResult<Update> {
        let clock = MerkleClock::new(txn, self.desc.root_id, doc_id);

        let mut sub_deltas = BTreeMap::new();
        for (name, value) in fields {
            let field = self
                .schema
                .field_by_name(name)
                .ok_or_else(|| DbError::FieldNotFound(name.clone()))?;
            let mut delta = Delta::LwwRegister(LwwRegDelta {
                priority: 0,
                doc_id: doc_id.clone(),
                field_id: field.id.to_string(),
                data: value.to_cbor()?,
                schema_root: self.schema.root.clone(),
            });
            let block = clock.add_delta(&mut delta)?;
            sub_deltas.insert(field.id.to_string(), block.cid);
        }

        let mut composite = Delta::Composite(CompositeDelta {
            priority: 0,
            doc_id: doc_id.clone(),
            status,
            sub_deltas,
            schema_root: self.schema.root.clone(),
        });
        let block = clock.add_delta(&mut composite)?;

        Ok(Update {
            doc_id: doc_id.clone(),
            cid: block.cid,
            schema_root: self.schema.root.clone(),
            block: block.data,
            priority: composite.priority(),
        })
    }

    fn validate_fields(&self, fields: &BTreeMap<String, FieldValue>) -> DbResult<()> {
        for (name, value) in fields {
            let field = self
                .schema
                .field_by_name(name)
                .ok_or_else(|| DbError::FieldNotFound(name.clone()))?;
            if value.is_null() && !field.nillable {
                return Err(DbError::FieldKindMismatch {
                    field: name.clone(),
                    kind: field.kind.to_string(),
                });
            }
            if !value.matches_kind(field.kind) {
                return Err(DbError::FieldKindMismatch {
                    field: name.clone(),
                    kind: field.kind.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Policy-bound collections require an actor identity on every mutation.
    fn require_identity<'i>(
        &self,
        identity: Option<&'i ActorIdentity>,
    ) -> DbResult<Option<&'i ActorIdentity>> {
        if self.desc.policy.is_some() && identity.is_none() {
            return Err(DbError::MissingIdentity);
        }
        Ok(identity)
    }

    /// Writes fail closed: denied, unregistered, or anonymous access to a
    /// gated document is a permission error.
    fn check_write_access(
        &self,
        identity: Option<&ActorIdentity>,
        doc_id: &DocId,
    ) -> DbResult<()> {
        let Some(policy) = &self.desc.policy else {
            return Ok(());
        };
        let identity = identity.ok_or(DbError::MissingIdentity)?;
        let allowed = self.db.acp().ok_or(DbError::AcpNotConfigured)?.check_doc_access(
            DocPermission::Write,
            identity,
            &policy.id,
            &policy.resource,
            doc_id.as_str(),
        )?;
        if !allowed {
            return Err(DbError::PermissionDenied);
        }
        Ok(())
    }

    /// Read gating decision. Ungated collections are public.
    fn read_allowed(
        &self,
        identity: Option<&ActorIdentity>,
        doc_id: &DocId,
    ) -> DbResult<bool> {
        let Some(policy) = &self.desc.policy else {
            return Ok(true);
        };
        let Some(identity) = identity else {
            return Ok(false);
        };
        Ok(self.db.acp().ok_or(DbError::AcpNotConfigured)?.check_doc_access(
            DocPermission::Read,
            identity,
            &policy.id,
            &policy.resource,
            doc_id.as_str(),
        )?)
    }

    /// Bring a document written at an earlier schema version up to the
    /// collection's active version through the lens registry.
    fn migrate_to_current(&self, doc: Document) -> DbResult<Document> {
        let missing_any = self
            .schema
            .fields
            .iter()
            .any(|f| doc.get(&f.name).is_none());
        if !missing_any {
            return Ok(doc);
        }
        // The source version is reconstructed from the fields the document
        // actually carries.
        let present_fields = self
            .schema
            .fields
            .iter()
            .filter(|f| doc.get(&f.name).is_some())
            .cloned()
            .collect();
        let from = SchemaDescription {
            name: self.schema.name.clone(),
            root: self.schema.root.clone(),
            version_id: self.schema.version_id.clone(),
            fields: present_fields,
        };
        self.db.lens().migrate(doc, &from, &self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{AcpConfig, DbConfig};
    use oxbow_query::FilterOp;
    use oxbow_store::MemoryRootStore;
    use std::sync::Arc;

    const USERS: &str = "type Users {\n    Name: String\n    Age: Int\n    HeightM: Float\n}";

    const USERS_POLICY: &str = r#"
description: a policy

actor:
  name: actor

resources:
  users:
    permissions:
      write:
        expr: owner
      read:
        expr: owner + reader

    relations:
      owner:
        types:
          - actor
      reader:
        types:
          - actor
"#;

    fn db() -> Db {
        Db::new(Arc::new(MemoryRootStore::new()), DbConfig::default()).unwrap()
    }

    fn db_with_acp() -> Db {
        Db::new(
            Arc::new(MemoryRootStore::new()),
            DbConfig {
                acp: AcpConfig::InMemory,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn identity1() -> ActorIdentity {
        ActorIdentity::new("cosmos1zzg43wdrhmmk89z3pmejwete2kkd4a3vn7w969").unwrap()
    }

    fn identity2() -> ActorIdentity {
        ActorIdentity::new("cosmos1x25hhksxhu86r45hqwk28dd70qzux3262hdrll").unwrap()
    }

    fn john() -> BTreeMap<String, FieldValue> {
        let mut fields = BTreeMap::new();
        fields.insert("Name".to_string(), FieldValue::String("John".to_string()));
        fields.insert("Age".to_string(), FieldValue::Int(21));
        fields
    }

    // -----------------------------------------------------------------------
    // Create / read / update / delete
    // -----------------------------------------------------------------------

    #[test]
    fn create_and_get_roundtrip() {
        let db = db();
        db.add_schema(USERS).unwrap();
        let collection = db.collection("Users").unwrap();

        let doc_id = collection.create(None, john()).unwrap();
        let doc = collection.get(None, &doc_id).unwrap();
        assert_eq!(doc.get("Name"), Some(&FieldValue::String("John".to_string())));
        assert_eq!(doc.get("Age"), Some(&FieldValue::Int(21)));
    }

    #[test]
    fn create_is_content_addressed() {
        let db = db();
        db.add_schema(USERS).unwrap();
        let collection = db.collection("Users").unwrap();

        collection.create(None, john()).unwrap();
        let err = collection.create(None, john()).unwrap_err();
        assert!(matches!(err, DbError::DocumentAlreadyExists));
    }

    #[test]
    fn create_rejects_unknown_fields_and_bad_kinds() {
        let db = db();
        db.add_schema(USERS).unwrap();
        let collection = db.collection("Users").unwrap();

        let mut fields = john();
        fields.insert("Nickname".to_string(), FieldValue::String("J".to_string()));
        assert!(matches!(
            collection.create(None, fields).unwrap_err(),
            DbError::FieldNotFound(name) if name == "Nickname"
        ));

        let mut fields = john();
        fields.insert("Age".to_string(), FieldValue::String("old".to_string()));
        assert!(matches!(
            collection.create(None, fields).unwrap_err(),
            DbError::FieldKindMismatch { field, .. } if field == "Age"
        ));
    }

    #[test]
    fn update_changes_the_document() {
        let db = db();
        db.add_schema(USERS).unwrap();
        let collection = db.collection("Users").unwrap();

        let doc_id = collection.create(None, john()).unwrap();
        let mut changes = BTreeMap::new();
        changes.insert("Age".to_string(), FieldValue::Int(22));
        collection.update(None, &doc_id, changes).unwrap();

        let doc = collection.get(None, &doc_id).unwrap();
        assert_eq!(doc.get("Age"), Some(&FieldValue::Int(22)));
        // Untouched fields survive.
        assert_eq!(doc.get("Name"), Some(&FieldValue::String("John".to_string())));
    }

    #[test]
    fn update_of_missing_document_is_not_found() {
        let db = db();
        db.add_schema(USERS).unwrap();
        let collection = db.collection("Users").unwrap();

        let ghost = Document::generate_id(&john(), &collection.schema().root).unwrap();
        let mut changes = BTreeMap::new();
        changes.insert("Age".to_string(), FieldValue::Int(22));
        assert!(matches!(
            collection.update(None, &ghost, changes).unwrap_err(),
            DbError::DocumentNotFound
        ));
    }

    #[test]
    fn delete_tombstones_the_document() {
        let db = db();
        db.add_schema(USERS).unwrap();
        let collection = db.collection("Users").unwrap();

        let doc_id = collection.create(None, john()).unwrap();
        collection.delete(None, &doc_id).unwrap();

        assert!(matches!(
            collection.get(None, &doc_id).unwrap_err(),
            DbError::DocumentNotFound
        ));
        // The DAG survives; the id is still enumerable for replication.
        assert_eq!(collection.all_doc_ids().unwrap().len(), 1);

        let mut changes = BTreeMap::new();
        changes.insert("Age".to_string(), FieldValue::Int(23));
        assert!(matches!(
            collection.update(None, &doc_id, changes).unwrap_err(),
            DbError::DocumentDeleted
        ));
    }

    // -----------------------------------------------------------------------
    // CRDT priorities through the public surface
    // -----------------------------------------------------------------------

    #[test]
    fn create_then_update_priorities_link() {
        let db = db();
        db.add_schema(USERS).unwrap();
        let collection = db.collection("Users").unwrap();

        let doc_id = collection.create(None, john()).unwrap();
        let (heads, priority) = collection.composite_heads(&doc_id).unwrap();
        assert_eq!(heads.len(), 1);
        assert_eq!(priority, 1);
        let create_head = heads[0];

        let mut changes = BTreeMap::new();
        changes.insert("Age".to_string(), FieldValue::Int(22));
        collection.update(None, &doc_id, changes).unwrap();

        let (heads, priority) = collection.composite_heads(&doc_id).unwrap();
        assert_eq!(heads.len(), 1);
        assert_eq!(priority, 2);

        // The update block links the create block as its parent.
        let block = collection.get_block(&doc_id, &heads[0]).unwrap().unwrap();
        let (_, links) = oxbow_crdt::decode_node(&block).unwrap();
        assert_eq!(oxbow_crdt::parent_cids(&links), vec![create_head]);
    }

    #[test]
    fn events_fire_with_create_and_update_priorities() {
        let db = db();
        db.add_schema(USERS).unwrap();
        let collection = db.collection("Users").unwrap();
        let mut events = db.events().subscribe();

        let doc_id = collection.create(None, john()).unwrap();
        let mut changes = BTreeMap::new();
        changes.insert("Age".to_string(), FieldValue::Int(22));
        collection.update(None, &doc_id, changes).unwrap();

        let created = events.try_recv().unwrap();
        assert_eq!(created.priority, 1);
        assert_eq!(created.doc_id, doc_id);
        let updated = events.try_recv().unwrap();
        assert_eq!(updated.priority, 2);
    }

    // -----------------------------------------------------------------------
    // Queries and indexes
    // -----------------------------------------------------------------------

    fn height_fixture(db: &Db) -> Collection<'_> {
        db.add_schema(USERS).unwrap();
        let collection = db.collection("Users").unwrap();
        let mut tall = BTreeMap::new();
        tall.insert("Name".to_string(), FieldValue::String("Shahzad".to_string()));
        tall.insert("HeightM".to_string(), FieldValue::Float(2.1));
        collection.create(None, tall).unwrap();
        let mut short = BTreeMap::new();
        short.insert("Name".to_string(), FieldValue::String("Andy".to_string()));
        short.insert("HeightM".to_string(), FieldValue::Float(1.82));
        collection.create(None, short).unwrap();
        collection
    }

    #[test]
    fn float_le_filter_returns_exact_matches() {
        let db = db();
        let collection = height_fixture(&db);

        let filter = Filter::le("HeightM", FieldValue::Float(1.82));
        let result = collection.query(None, Some(&filter)).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get("HeightM"), Some(&FieldValue::Float(1.82)));

        let filter = Filter::le("HeightM", FieldValue::Int(2));
        let result = collection.query(None, Some(&filter)).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get("HeightM"), Some(&FieldValue::Float(1.82)));
    }

    #[test]
    fn indexed_query_matches_scan() {
        let db = db();
        db.add_schema("type Indexed {\n    Name: String @index\n    Age: Int\n}")
            .unwrap();
        let collection = db.collection("Indexed").unwrap();
        let mut fields = BTreeMap::new();
        fields.insert("Name".to_string(), FieldValue::String("John".to_string()));
        fields.insert("Age".to_string(), FieldValue::Int(21));
        collection.create(None, fields).unwrap();
        let mut fields = BTreeMap::new();
        fields.insert("Name".to_string(), FieldValue::String("Islam".to_string()));
        fields.insert("Age".to_string(), FieldValue::Int(32));
        collection.create(None, fields).unwrap();

        let filter = Filter::eq("Name", FieldValue::String("John".to_string()));
        let result = collection.query(None, Some(&filter)).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].get("Age"), Some(&FieldValue::Int(21)));
    }

    #[test]
    fn deleted_documents_leave_queries() {
        let db = db();
        let collection = height_fixture(&db);

        let filter = Filter::condition("Name", FilterOp::Eq, FieldValue::String("Andy".to_string()));
        let result = collection.query(None, Some(&filter)).unwrap();
        assert_eq!(result.len(), 1);
        collection.delete(None, &result[0].doc_id).unwrap();

        let result = collection.query(None, Some(&filter)).unwrap();
        assert!(result.is_empty());
    }

    // -----------------------------------------------------------------------
    // Access control gate
    // -----------------------------------------------------------------------

    fn gated_collection(db: &Db) -> Collection<'_> {
        let policy_id = db
            .acp()
            .unwrap()
            .add_policy(&identity1(), USERS_POLICY)
            .unwrap();
        db.add_schema(&format!(
            "type Users @policy(id: \"{policy_id}\", resource: \"users\") {{\n    Name: String\n    Age: Int\n    HeightM: Float\n}}"
        ))
        .unwrap();
        db.collection("Users").unwrap()
    }

    #[test]
    fn gated_create_requires_identity() {
        let db = db_with_acp();
        let collection = gated_collection(&db);
        assert!(matches!(
            collection.create(None, john()).unwrap_err(),
            DbError::MissingIdentity
        ));
    }

    #[test]
    fn gated_create_registers_the_document() {
        let db = db_with_acp();
        let collection = gated_collection(&db);
        let identity = identity1();

        let doc_id = collection.create(Some(&identity), john()).unwrap();
        let policy = collection.description().policy.clone().unwrap();
        assert!(db
            .acp()
            .unwrap()
            .is_doc_registered(&policy.id, &policy.resource, doc_id.as_str())
            .unwrap());
    }

    #[test]
    fn gated_read_hides_documents_from_other_actors() {
        let db = db_with_acp();
        let collection = gated_collection(&db);
        let owner = identity1();
        let stranger = identity2();

        let doc_id = collection.create(Some(&owner), john()).unwrap();

        // The owner reads it back; a stranger sees not-found, not denied.
        assert!(collection.get(Some(&owner), &doc_id).is_ok());
        assert!(matches!(
            collection.get(Some(&stranger), &doc_id).unwrap_err(),
            DbError::DocumentNotFound
        ));
        assert!(matches!(
            collection.get(None, &doc_id).unwrap_err(),
            DbError::DocumentNotFound
        ));
    }

    #[test]
    fn gated_write_denies_other_actors() {
        let db = db_with_acp();
        let collection = gated_collection(&db);
        let owner = identity1();
        let stranger = identity2();

        let doc_id = collection.create(Some(&owner), john()).unwrap();
        let mut changes = BTreeMap::new();
        changes.insert("Age".to_string(), FieldValue::Int(22));

        assert!(matches!(
            collection
                .update(Some(&stranger), &doc_id, changes.clone())
                .unwrap_err(),
            DbError::PermissionDenied
        ));
        collection.update(Some(&owner), &doc_id, changes).unwrap();

        assert!(matches!(
            collection.delete(Some(&stranger), &doc_id).unwrap_err(),
            DbError::PermissionDenied
        ));
    }

    #[test]
    fn gated_query_filters_invisible_documents() {
        let db = db_with_acp();
        let collection = gated_collection(&db);
        let owner = identity1();
        let stranger = identity2();

        collection.create(Some(&owner), john()).unwrap();

        assert_eq!(collection.query(Some(&owner), None).unwrap().len(), 1);
        assert!(collection.query(Some(&stranger), None).unwrap().is_empty());
        assert!(collection.query(None, None).unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Schema versions and the lens seam
    // -----------------------------------------------------------------------

    #[test]
    fn documents_created_before_a_patch_read_with_defaults() {
        let db = db();
        db.add_schema(USERS).unwrap();
        let collection = db.collection("Users").unwrap();
        let doc_id = collection.create(None, john()).unwrap();

        db.patch_schema(
            "Users",
            r#"[{"op": "add", "path": "/fields/-", "value": {"name": "Email", "kind": "string", "nillable": true}}]"#,
        )
        .unwrap();

        // Reload the handle at the new version; the old document reads with
        // the added field defaulted.
        let collection = db.collection("Users").unwrap();
        let doc = collection.get(None, &doc_id).unwrap();
        assert_eq!(doc.get("Email"), Some(&FieldValue::Null));
        assert_eq!(doc.get("Name"), Some(&FieldValue::String("John".to_string())));
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    #[test]
    fn collection_source_view_materializes_from_source() {
        let db = db();
        db.add_schema(USERS).unwrap();
        let users = db.collection("Users").unwrap();
        users.create(None, john()).unwrap();

        // Hand-build a view over Users.
        let view_desc = CollectionDescription {
            name: Some("UsersView".to_string()),
            id: oxbow_types::CollectionId(99),
            root_id: oxbow_types::CollectionId(99),
            schema_version_id: users.description().schema_version_id.clone(),
            sources: vec![Source::Collection(oxbow_types::CollectionSource {
                source_collection_id: users.description().id,
                transform: None,
            })],
            indexes: Vec::new(),
            policy: None,
        };
        let view = Collection::new(&db, view_desc, users.schema().clone());
        let docs = view.materialize(None).unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].get("Name"), Some(&FieldValue::String("John".to_string())));
    }

    #[test]
    fn query_source_view_materializes_from_named_collection() {
        let db = db();
        db.add_schema(USERS).unwrap();
        let users = db.collection("Users").unwrap();
        users.create(None, john()).unwrap();

        let view_desc = CollectionDescription {
            name: Some("Everyone".to_string()),
            id: oxbow_types::CollectionId(98),
            root_id: oxbow_types::CollectionId(98),
            schema_version_id: users.description().schema_version_id.clone(),
            sources: vec![Source::Query(oxbow_types::QuerySource {
                query: "Users".to_string(),
                transform: None,
            })],
            indexes: Vec::new(),
            policy: None,
        };
        let view = Collection::new(&db, view_desc, users.schema().clone());
        assert_eq!(view.materialize(None).unwrap().len(), 1);
    }
}
