//! In-memory substrate for tests and local runs.
//!
//! `MemoryStore` implements [`SkvClient`] over process memory with snapshot
//! isolation:
//!
//! - a transaction reads a snapshot taken at begin, overlaid with its own
//!   buffered writes
//! - commit validates first-committer-wins per key and fails with 409
//! - every operation after the transaction deadline fails with 408
//!
//! Faults can be injected to exercise status translation in callers.

mod txn;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tracing::debug;

use crate::client::{SkvClient, SkvResponse, SkvTxn, TxnOptions};
use crate::dto::{CollectionCreateRequest, CollectionMetadata, FieldValue, Query, Schema, SkvStatus};

pub use txn::MemoryTxn;

/// A committed row image.
#[derive(Debug, Clone)]
struct StoredRow {
    schema: Arc<Schema>,
    values: Vec<Option<FieldValue>>,
}

/// One committed version of a key; `row == None` is a tombstone.
#[derive(Debug, Clone)]
struct RowVersion {
    commit_ts: u64,
    row: Option<StoredRow>,
}

#[derive(Debug)]
struct CollectionData {
    metadata: CollectionMetadata,
    schemas: HashMap<String, BTreeMap<u32, Arc<Schema>>>,
    rows: HashMap<String, BTreeMap<Bytes, Vec<RowVersion>>>,
}

impl CollectionData {
    fn schema(&self, name: &str, version: Option<u32>) -> Option<&Arc<Schema>> {
        let versions = self.schemas.get(name)?;
        match version {
            Some(v) => versions.get(&v),
            None => versions.values().next_back(),
        }
    }

    fn latest_commit_ts(&self, schema: &str, key: &Bytes) -> Option<u64> {
        self.rows.get(schema)?.get(key)?.last().map(|v| v.commit_ts)
    }

    fn visible(&self, schema: &str, key: &Bytes, snapshot_ts: u64) -> Option<StoredRow> {
        self.rows
            .get(schema)?
            .get(key)?
            .iter()
            .rev()
            .find(|v| v.commit_ts <= snapshot_ts)
            .and_then(|v| v.row.clone())
    }
}

#[derive(Debug, Default)]
struct StoreState {
    clock: u64,
    collections: HashMap<String, CollectionData>,
}

#[derive(Debug, Default)]
struct StoreInner {
    state: RwLock<StoreState>,
    next_txn_id: AtomicU64,
    faults: Mutex<VecDeque<SkvStatus>>,
}

impl StoreInner {
    fn take_fault(&self) -> Option<SkvStatus> {
        self.faults.lock().pop_front()
    }
}

/// In-process substrate implementing [`SkvClient`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store wrapped in Arc.
    #[must_use]
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Makes the next transactional data operation fail with `status`.
    ///
    /// Faults queue up and are consumed one per operation.
    pub fn inject_fault(&self, status: SkvStatus) {
        self.inner.faults.lock().push_back(status);
    }

    /// Returns true if the collection exists.
    #[must_use]
    pub fn has_collection(&self, name: &str) -> bool {
        self.inner.state.read().collections.contains_key(name)
    }

    /// Number of committed live rows in a schema.
    #[must_use]
    pub fn row_count(&self, collection: &str, schema: &str) -> usize {
        let state = self.inner.state.read();
        state
            .collections
            .get(collection)
            .and_then(|c| c.rows.get(schema))
            .map_or(0, |rows| {
                rows.values()
                    .filter(|versions| versions.last().is_some_and(|v| v.row.is_some()))
                    .count()
            })
    }
}

#[async_trait]
impl SkvClient for MemoryStore {
    async fn create_collection(&self, request: CollectionCreateRequest) -> SkvStatus {
        let mut state = self.inner.state.write();
        let name = request.metadata.name.clone();
        if state.collections.contains_key(&name) {
            return SkvStatus::conflict(format!("collection {name} already exists"));
        }
        debug!(collection = %name, scheme = ?request.metadata.hash_scheme, "creating collection");
        state.collections.insert(
            name,
            CollectionData {
                metadata: request.metadata,
                schemas: HashMap::new(),
                rows: HashMap::new(),
            },
        );
        SkvStatus::created("collection created")
    }

    async fn get_schema(
        &self,
        collection: &str,
        schema_name: &str,
        version: Option<u32>,
    ) -> SkvResponse<Arc<Schema>> {
        let state = self.inner.state.read();
        let Some(coll) = state.collections.get(collection) else {
            return SkvResponse::status(SkvStatus::not_found(format!(
                "collection {collection} not found"
            )));
        };
        match coll.schema(schema_name, version) {
            Some(schema) => SkvResponse::ok(Arc::clone(schema)),
            None => SkvResponse::status(SkvStatus::not_found(format!(
                "schema {schema_name} version {version:?} not found"
            ))),
        }
    }

    async fn create_schema(&self, collection: &str, schema: Schema) -> SkvStatus {
        if let Err(e) = schema.validate() {
            return SkvStatus::bad_request(e.to_string());
        }
        let mut state = self.inner.state.write();
        let Some(coll) = state.collections.get_mut(collection) else {
            return SkvStatus::not_found(format!("collection {collection} not found"));
        };
        let versions = coll.schemas.entry(schema.name.clone()).or_default();
        if versions.contains_key(&schema.version) {
            return SkvStatus::conflict(format!(
                "schema {} version {} already exists",
                schema.name, schema.version
            ));
        }
        debug!(
            collection = %coll.metadata.name,
            schema = %schema.name,
            version = schema.version,
            "creating schema"
        );
        versions.insert(schema.version, Arc::new(schema));
        SkvStatus::created("schema created")
    }

    async fn create_scan_read(&self, collection: &str, schema_name: &str) -> SkvResponse<Query> {
        match self.get_schema(collection, schema_name, None).await.into_result() {
            Ok(schema) => SkvResponse::ok(Query::new(collection, schema)),
            Err(status) => SkvResponse::status(status),
        }
    }

    async fn begin_txn(&self, options: TxnOptions) -> SkvResponse<Arc<dyn SkvTxn>> {
        let id = self.inner.next_txn_id.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot_ts = self.inner.state.read().clock;
        let deadline = Instant::now() + options.timeout;
        debug!(txn = id, snapshot_ts, "begin");
        let txn = MemoryTxn::new(id, Arc::clone(&self.inner), snapshot_ts, deadline);
        SkvResponse::ok(Arc::new(txn) as Arc<dyn SkvTxn>)
    }
}

#[cfg(test)]
mod tests;
