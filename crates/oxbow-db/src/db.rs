use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use oxbow_acp::{AcpProvider, InMemoryAcp, PersistentAcp};
use oxbow_crdt::{MerkleClock, RemoteApply};
use oxbow_keys::{CollectionIndexKey, Key};
use oxbow_store::{
    ConcurrentTransaction, MultiStore, RootStore, Sequence, Transaction, COLLECTION_SEQ,
};
use oxbow_types::{
    CollectionDescription, CollectionId, DocId, Document, IndexDescription,
    IndexedFieldDescription, PolicyDescription, SchemaDescription, SchemaRoot, SchemaVersionId,
};

use crate::collection::Collection;
use crate::descriptions::{self, CollectionFetchOptions};
use crate::error::{DbError, DbResult};
use crate::events::{EventBus, UPDATE_EVENT_BUFFER_SIZE};
use crate::fetcher::CollectionFetcher;
use crate::lens::{DefaultsLens, LensRegistry};
use crate::patch;
use crate::schema_definition::SchemaDefinition;

/// Access control configuration.
#[derive(Clone, Debug, Default)]
pub enum AcpConfig {
    /// No access control; policy-carrying schemas are rejected.
    #[default]
    Disabled,
    /// Ephemeral provider: state dies with the process.
    InMemory,
    /// Durable provider rooted at the given path.
    Persistent(PathBuf),
}

/// Database configuration.
#[derive(Clone, Debug)]
pub struct DbConfig {
    /// Maximum number of attempts for an implicit transaction.
    pub max_txn_retries: usize,
    /// Update-event channel capacity per subscriber.
    pub update_event_buffer: usize,
    pub acp: AcpConfig,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            max_txn_retries: 5,
            update_event_buffer: UPDATE_EVENT_BUFFER_SIZE,
            acp: AcpConfig::Disabled,
        }
    }
}

/// The Oxbow database.
///
/// A constructed object with an explicit lifecycle: no global state beyond
/// the process logger. Owns the multi-store, the optional access control
/// provider, the lens registry, and the update-event bus.
pub struct Db {
    multistore: MultiStore,
    acp: Option<Arc<dyn AcpProvider>>,
    lens: Arc<dyn LensRegistry>,
    events: EventBus,
    config: DbConfig,
}

impl Db {
    /// Construct a database over the given root store.
    ///
    /// The access control provider is fully initialized here, before any
    /// collection description referencing a policy can be loaded.
    pub fn new(root: Arc<dyn RootStore>, config: DbConfig) -> DbResult<Self> {
        let acp: Option<Arc<dyn AcpProvider>> = match &config.acp {
            AcpConfig::Disabled => None,
            AcpConfig::InMemory => Some(Arc::new(InMemoryAcp::new())),
            AcpConfig::Persistent(path) => Some(Arc::new(PersistentAcp::open(path)?)),
        };

        let db = Self {
            multistore: MultiStore::new(root),
            acp,
            lens: Arc::new(DefaultsLens),
            events: EventBus::new(config.update_event_buffer),
            config,
        };
        info!("database initialized");
        Ok(db)
    }

    /// Shut down: the event bus stops first, the ACP provider last, so no
    /// in-flight gated operation can observe a closed provider.
    pub fn close(&self) -> DbResult<()> {
        // Dropping all subscribers is the bus shutdown; nothing to signal.
        if let Some(acp) = &self.acp {
            acp.close()?;
        }
        info!("database closed");
        Ok(())
    }

    /// Create a new transaction.
    pub fn new_txn(&self, readonly: bool) -> Transaction {
        self.multistore.new_txn(readonly)
    }

    /// Create a new transaction that supports concurrent operations.
    pub fn new_concurrent_txn(&self, readonly: bool) -> ConcurrentTransaction {
        self.multistore.new_concurrent_txn(readonly)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn acp(&self) -> Option<&Arc<dyn AcpProvider>> {
        self.acp.as_ref()
    }

    pub fn lens(&self) -> &Arc<dyn LensRegistry> {
        &self.lens
    }

    pub fn max_txn_retries(&self) -> usize {
        self.config.max_txn_retries
    }

    /// Run an operation in an implicit transaction, retrying on conflicts up
    /// to the configured maximum.
    pub fn retry<T>(&self, op: impl Fn(&Transaction) -> DbResult<T>) -> DbResult<T> {
        for attempt in 1..=self.config.max_txn_retries {
            let txn = self.new_txn(false);
            match op(&txn) {
                Ok(value) => match txn.commit() {
                    Ok(()) => return Ok(value),
                    Err(e) if e.is_retryable() => {
                        debug!(attempt, "transaction conflict, retrying");
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                },
                Err(e) if e.is_retryable() => {
                    txn.discard();
                    debug!(attempt, "retryable failure, retrying");
                    continue;
                }
                Err(e) => {
                    txn.discard();
                    return Err(e);
                }
            }
        }
        Err(DbError::RetriesExhausted(self.config.max_txn_retries))
    }

    // -----------------------------------------------------------------------
    // Schema lifecycle
    // -----------------------------------------------------------------------

    /// Parse and register a schema, creating its collection. Implicit
    /// transaction flavor.
    pub fn add_schema(&self, definition: &str) -> DbResult<CollectionDescription> {
        let parsed = SchemaDefinition::parse(definition)?;
        self.retry(|txn| self.add_schema_with_txn(txn, &parsed))
    }

    /// Register a parsed schema within the caller's transaction.
    pub fn add_schema_with_txn(
        &self,
        txn: &Transaction,
        definition: &SchemaDefinition,
    ) -> DbResult<CollectionDescription> {
        if descriptions::collection_by_name(txn, &definition.name)?.is_some() {
            return Err(DbError::SchemaTypeAlreadyExists(definition.name.clone()));
        }

        // Policy bindings are validated against the ACP module before
        // anything is persisted, so an invalid policy id or an unknown
        // resource never reaches the store.
        let policy = match &definition.policy {
            None => None,
            Some((policy_id, resource)) => {
                let acp = self.acp.as_ref().ok_or(DbError::AcpNotConfigured)?;
                acp.validate_resource_exists_on_valid_dpi(policy_id, resource)?;
                Some(PolicyDescription {
                    id: policy_id.clone(),
                    resource: resource.clone(),
                })
            }
        };

        let collection_id =
            CollectionId(Sequence::new(COLLECTION_SEQ).next(txn)? as u32);

        let fields = definition
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| oxbow_types::FieldDescription {
                name: f.name.clone(),
                id: oxbow_types::FieldId(i as u32 + 1),
                kind: f.kind,
                nillable: f.nillable,
            })
            .collect();
        let schema = SchemaDescription::new(definition.name.clone(), fields);
        descriptions::save_schema(txn, &schema)?;

        let index_seq = Sequence::new(oxbow_store::index_seq_name(collection_id.0));
        let mut indexes = Vec::new();
        for field in definition.fields.iter().filter(|f| f.indexed) {
            let index = IndexDescription {
                name: format!("{}_{}", definition.name, field.name),
                id: index_seq.next(txn)? as u32,
                fields: vec![IndexedFieldDescription {
                    name: field.name.clone(),
                    descending: false,
                }],
                unique: false,
            };
            let index_key = CollectionIndexKey::new(Some(collection_id), index.name.clone());
            let index_bytes = serde_json::to_vec(&index)
                .map_err(|e| DbError::UnmarshalCollection(e.to_string()))?;
            txn.system().put(&index_key.to_bytes(), &index_bytes)?;
            indexes.push(index);
        }

        let desc = CollectionDescription {
            name: Some(definition.name.clone()),
            id: collection_id,
            root_id: collection_id,
            schema_version_id: schema.version_id.clone(),
            sources: Vec::new(),
            indexes,
            policy,
        };
        descriptions::save_collection(txn, &desc)?;

        if let Some(policy_key) = &desc.policy {
            let key = oxbow_keys::CollectionPolicyKey::new(collection_id);
            let bytes = serde_json::to_vec(policy_key)
                .map_err(|e| DbError::UnmarshalCollection(e.to_string()))?;
            txn.system().put(&key.to_bytes(), &bytes)?;
        }

        info!(collection = %definition.name, id = %collection_id, "schema added");
        Ok(desc)
    }

    /// Apply a JSON-patch to a schema, producing a new schema version and
    /// moving the collection to it.
    pub fn patch_schema(&self, name: &str, patch_text: &str) -> DbResult<CollectionDescription> {
        self.retry(|txn| {
            let mut desc = descriptions::collection_by_name(txn, name)?
                .ok_or_else(|| DbError::CollectionNotFound(name.to_string()))?;
            let schema = descriptions::schema_by_version(txn, &desc.schema_version_id)?
                .ok_or_else(|| {
                    DbError::SchemaVersionNotFound(desc.schema_version_id.0.clone())
                })?;

            let new_fields = patch::apply_patch(&schema, patch_text)?;
            patch::validate_morphism(&schema, &new_fields)?;

            let next = schema.next_version(new_fields);
            descriptions::save_schema(txn, &next)?;

            desc.schema_version_id = next.version_id.clone();
            descriptions::save_collection(txn, &desc)?;

            info!(collection = name, version = %next.version_id, "schema patched");
            Ok(desc)
        })
    }

    // -----------------------------------------------------------------------
    // Collections and schemas
    // -----------------------------------------------------------------------

    /// A handle to the collection with the given name.
    pub fn collection(&self, name: &str) -> DbResult<Collection<'_>> {
        let txn = self.new_txn(true);
        let desc = descriptions::collection_by_name(&txn, name)?
            .ok_or_else(|| DbError::CollectionNotFound(name.to_string()))?;
        let schema = descriptions::schema_by_version(&txn, &desc.schema_version_id)?
            .ok_or_else(|| DbError::SchemaVersionNotFound(desc.schema_version_id.0.clone()))?;
        Ok(Collection::new(self, desc, schema))
    }

    /// A handle to the collection whose schema root matches.
    pub fn collection_by_schema_root(&self, root: &SchemaRoot) -> DbResult<Collection<'_>> {
        let txn = self.new_txn(true);
        let descs = descriptions::collections(
            &txn,
            &CollectionFetchOptions {
                schema_root: Some(root.clone()),
                ..Default::default()
            },
        )?;
        let desc = descs
            .into_iter()
            .next()
            .ok_or_else(|| DbError::CollectionNotFound(root.as_str().to_string()))?;
        let schema = descriptions::schema_by_version(&txn, &desc.schema_version_id)?
            .ok_or_else(|| DbError::SchemaVersionNotFound(desc.schema_version_id.0.clone()))?;
        Ok(Collection::new(self, desc, schema))
    }

    /// Enumerate collection descriptions.
    pub fn collections(
        &self,
        options: &CollectionFetchOptions,
    ) -> DbResult<Vec<CollectionDescription>> {
        let txn = self.new_txn(true);
        descriptions::collections(&txn, options)
    }

    /// Fetch a schema by version id.
    pub fn schema_by_version(
        &self,
        version_id: &SchemaVersionId,
    ) -> DbResult<Option<SchemaDescription>> {
        if version_id.as_str().is_empty() {
            return Err(DbError::SchemaIdEmpty);
        }
        let txn = self.new_txn(true);
        descriptions::schema_by_version(&txn, version_id)
    }

    // -----------------------------------------------------------------------
    // Remote block application (driven by the sync peer)
    // -----------------------------------------------------------------------

    /// Apply a block received over pubsub. Returns missing parent CIDs for
    /// the peer's DAG syncer to fetch.
    pub fn apply_remote_block(
        &self,
        doc_id: &DocId,
        schema_root: &SchemaRoot,
        block: &[u8],
    ) -> DbResult<RemoteApply> {
        let collection = self.collection_by_schema_root(schema_root)?;
        self.retry(|txn| {
            let old = CollectionFetcher::new(txn, collection.description(), collection.schema())
                .fetch(doc_id)?;
            let clock = MerkleClock::new(txn, collection.description().root_id, doc_id);
            let result = clock.apply_remote(block)?;
            self.reindex_after_apply(txn, &collection, doc_id, old)?;
            Ok(result)
        })
    }

    /// Apply a block fetched during a DAG walk rooted at `root_cid`.
    pub fn apply_fetched_block(
        &self,
        doc_id: &DocId,
        schema_root: &SchemaRoot,
        root_cid: &cid::Cid,
        root_priority: u64,
        block: &[u8],
    ) -> DbResult<RemoteApply> {
        let collection = self.collection_by_schema_root(schema_root)?;
        self.retry(|txn| {
            let old = CollectionFetcher::new(txn, collection.description(), collection.schema())
                .fetch(doc_id)?;
            let clock = MerkleClock::new(txn, collection.description().root_id, doc_id);
            let result = clock.apply_fetched(root_cid, root_priority, block)?;
            self.reindex_after_apply(txn, &collection, doc_id, old)?;
            Ok(result)
        })
    }

    /// Fetch a stored delta block by CID, regardless of owning document.
    pub fn block(&self, cid: &cid::Cid) -> DbResult<Option<Vec<u8>>> {
        let txn = self.new_txn(true);
        Ok(txn.block().get(&oxbow_crdt::block_key(cid))?)
    }

    /// Bring secondary indexes and the primary key row in line with the
    /// post-apply document state.
    fn reindex_after_apply(
        &self,
        txn: &Transaction,
        collection: &Collection<'_>,
        doc_id: &DocId,
        old: Option<Document>,
    ) -> DbResult<()> {
        let primary =
            oxbow_keys::PrimaryDataStoreKey::new(collection.description().root_id, doc_id);
        txn.data().put(&primary.to_bytes(), &[])?;

        let fetcher =
            CollectionFetcher::new(txn, collection.description(), collection.schema());
        let Some(new) = fetcher.fetch(doc_id)? else {
            warn!(doc = %doc_id, "document vanished during remote apply");
            return Ok(());
        };
        let manager = oxbow_index::IndexManager::new(txn, collection.description());
        match old {
            None => manager.save(&new)?,
            Some(old) if new.deleted => manager.delete(&old)?,
            Some(old) => manager.update(&old, &new)?,
        }
        Ok(())
    }
}
