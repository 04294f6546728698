//! Transactions over the in-memory store.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::client::{ScanPage, SkvResponse, SkvTxn};
use crate::dto::{key_in_range, FieldValue, Key, Query, Schema, SkvRecord, SkvStatus};

use super::{CollectionData, RowVersion, StoreInner, StoredRow};

/// (collection, schema, encoded key)
type WriteKey = (String, String, Bytes);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnState {
    Active,
    Committed,
    Aborted,
}

/// A transaction against a [`MemoryStore`](super::MemoryStore).
pub struct MemoryTxn {
    id: u64,
    store: Arc<StoreInner>,
    snapshot_ts: u64,
    deadline: Instant,
    state: Mutex<TxnState>,
    writes: Mutex<BTreeMap<WriteKey, Option<StoredRow>>>,
}

impl fmt::Debug for MemoryTxn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryTxn")
            .field("id", &self.id)
            .field("snapshot_ts", &self.snapshot_ts)
            .field("state", &*self.state.lock())
            .finish()
    }
}

impl MemoryTxn {
    pub(super) fn new(id: u64, store: Arc<StoreInner>, snapshot_ts: u64, deadline: Instant) -> Self {
        Self {
            id,
            store,
            snapshot_ts,
            deadline,
            state: Mutex::new(TxnState::Active),
            writes: Mutex::new(BTreeMap::new()),
        }
    }

    /// Substrate-assigned transaction id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Fails unless the transaction is active and within its deadline.
    fn check_active(&self) -> Result<(), SkvStatus> {
        let mut state = self.state.lock();
        if *state != TxnState::Active {
            return Err(SkvStatus::gone(format!("transaction {} already ended", self.id)));
        }
        if Instant::now() > self.deadline {
            *state = TxnState::Aborted;
            self.writes.lock().clear();
            debug!(txn = self.id, "deadline exceeded, aborting");
            return Err(SkvStatus::request_timeout(format!(
                "transaction {} exceeded its deadline",
                self.id
            )));
        }
        Ok(())
    }

    /// Entry check for data operations: liveness, then injected faults.
    fn begin_op(&self) -> Result<(), SkvStatus> {
        self.check_active()?;
        match self.store.take_fault() {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }

    /// The row visible to this transaction: own writes over the snapshot.
    fn visible(&self, coll: &CollectionData, collection: &str, schema: &str, key: &Bytes) -> Option<StoredRow> {
        let write_key = (collection.to_string(), schema.to_string(), key.clone());
        if let Some(pending) = self.writes.lock().get(&write_key) {
            return pending.clone();
        }
        coll.visible(schema, key, self.snapshot_ts)
    }

    fn check_schema<'a>(
        coll: Option<&'a CollectionData>,
        collection: &str,
        schema: &Schema,
    ) -> Result<&'a CollectionData, SkvStatus> {
        let coll =
            coll.ok_or_else(|| SkvStatus::not_found(format!("collection {collection} not found")))?;
        if coll.schema(&schema.name, Some(schema.version)).is_none() {
            return Err(SkvStatus::not_found(format!(
                "schema {} version {} not found",
                schema.name, schema.version
            )));
        }
        Ok(coll)
    }

    fn check_conflict(&self, coll: &CollectionData, schema: &str, key: &Bytes) -> Result<(), SkvStatus> {
        match coll.latest_commit_ts(schema, key) {
            Some(ts) if ts > self.snapshot_ts => Err(SkvStatus::conflict(format!(
                "write-write conflict on {schema} in transaction {}",
                self.id
            ))),
            _ => Ok(()),
        }
    }

    fn to_record(collection: &str, row: StoredRow) -> SkvResponse<SkvRecord> {
        match SkvRecord::from_values(collection, row.schema, row.values) {
            Ok(record) => SkvResponse::ok(record),
            Err(e) => SkvResponse::status(SkvStatus::internal_error(e.to_string())),
        }
    }

    fn read_by_key(&self, collection: &str, schema_name: &str, key: &Bytes) -> SkvResponse<SkvRecord> {
        let state = self.store.state.read();
        let Some(coll) = state.collections.get(collection) else {
            return SkvResponse::status(SkvStatus::not_found(format!(
                "collection {collection} not found"
            )));
        };
        match self.visible(coll, collection, schema_name, key) {
            Some(row) => Self::to_record(collection, row),
            None => SkvResponse::status(SkvStatus::not_found("record not found")),
        }
    }

    fn commit(&self) -> SkvStatus {
        let mut state = self.store.state.write();
        let mut writes = self.writes.lock();

        let validation = writes.keys().try_for_each(|(collection, schema, key)| {
            let coll = state
                .collections
                .get(collection)
                .ok_or_else(|| SkvStatus::not_found(format!("collection {collection} not found")))?;
            self.check_conflict(coll, schema, key)
        });
        if let Err(status) = validation {
            writes.clear();
            debug!(txn = self.id, %status, "commit validation failed");
            return status;
        }

        state.clock += 1;
        let commit_ts = state.clock;
        for ((collection, schema, key), row) in std::mem::take(&mut *writes) {
            if let Some(coll) = state.collections.get_mut(&collection) {
                coll.rows
                    .entry(schema)
                    .or_default()
                    .entry(key)
                    .or_default()
                    .push(RowVersion { commit_ts, row });
            }
        }
        debug!(txn = self.id, commit_ts, "committed");
        SkvStatus::ok()
    }
}

/// Rebuilds `values` (laid out by `from`) for the layout of `to`, by field name.
fn realign(values: Vec<Option<FieldValue>>, from: &Schema, to: &Schema) -> Vec<Option<FieldValue>> {
    if from.version == to.version && from.name == to.name {
        return values;
    }
    to.fields
        .iter()
        .map(|field| {
            from.field_position(&field.name)
                .and_then(|pos| values.get(pos).cloned().flatten())
                .filter(|v| v.field_type() == field.field_type)
        })
        .collect()
}

#[async_trait]
impl SkvTxn for MemoryTxn {
    async fn read(&self, record: SkvRecord) -> SkvResponse<SkvRecord> {
        if let Err(status) = self.begin_op() {
            return SkvResponse::status(status);
        }
        let key = record.key();
        self.read_by_key(record.collection(), &key.schema_name, &key.partition_key)
    }

    async fn read_key(&self, collection: &str, key: Key) -> SkvResponse<SkvRecord> {
        if let Err(status) = self.begin_op() {
            return SkvResponse::status(status);
        }
        self.read_by_key(collection, &key.schema_name, &key.partition_key)
    }

    async fn write(&self, record: SkvRecord, erase: bool, reject_if_exists: bool) -> SkvStatus {
        if let Err(status) = self.begin_op() {
            return status;
        }
        let state = self.store.state.read();
        let collection = record.collection().to_string();
        let coll = match Self::check_schema(state.collections.get(&collection), &collection, record.schema()) {
            Ok(coll) => coll,
            Err(status) => return status,
        };

        let key = record.key();
        if let Err(status) = self.check_conflict(coll, &key.schema_name, &key.partition_key) {
            return status;
        }
        if reject_if_exists && self.visible(coll, &collection, &key.schema_name, &key.partition_key).is_some() {
            return SkvStatus::precondition_failed(format!("record already exists in {}", key.schema_name));
        }

        let row = if erase {
            None
        } else {
            let schema = Arc::clone(record.schema());
            Some(StoredRow { schema, values: record.into_values() })
        };
        self.writes.lock().insert((collection, key.schema_name, key.partition_key), row);
        SkvStatus::created("record written")
    }

    async fn partial_update(&self, record: SkvRecord, fields: Vec<usize>, key: Option<Key>) -> SkvStatus {
        if let Err(status) = self.begin_op() {
            return status;
        }
        let state = self.store.state.read();
        let collection = record.collection().to_string();
        let coll = match Self::check_schema(state.collections.get(&collection), &collection, record.schema()) {
            Ok(coll) => coll,
            Err(status) => return status,
        };

        let key = key.unwrap_or_else(|| record.key());
        if let Err(status) = self.check_conflict(coll, &key.schema_name, &key.partition_key) {
            return status;
        }
        let Some(existing) = self.visible(coll, &collection, &key.schema_name, &key.partition_key) else {
            return SkvStatus::not_found("record to update not found");
        };

        let schema = Arc::clone(record.schema());
        let mut values = realign(existing.values, &existing.schema, &schema);
        for pos in fields {
            let Some(slot) = values.get_mut(pos) else {
                return SkvStatus::bad_request(format!("field {pos} out of range for {}", schema.name));
            };
            *slot = record.field(pos).cloned();
        }
        self.writes
            .lock()
            .insert((collection, key.schema_name, key.partition_key), Some(StoredRow { schema, values }));
        SkvStatus::ok()
    }

    async fn scan_read(&self, mut query: Query) -> SkvResponse<ScanPage> {
        if let Err(status) = self.begin_op() {
            return SkvResponse::status(status);
        }
        if query.is_done() {
            return SkvResponse::ok(ScanPage { query, records: Vec::new() });
        }

        let state = self.store.state.read();
        let collection = query.collection().to_string();
        let schema_name = query.schema().name.clone();
        let Some(coll) = state.collections.get(&collection) else {
            return SkvResponse::status(SkvStatus::not_found(format!("collection {collection} not found")));
        };

        let start = query.start_record().key_prefix();
        let end = query.end_record().key_prefix();

        let mut visible: BTreeMap<Bytes, StoredRow> = BTreeMap::new();
        if let Some(rows) = coll.rows.get(&schema_name) {
            for key in rows.keys() {
                if key_in_range(key, &start, &end) {
                    if let Some(row) = coll.visible(&schema_name, key, self.snapshot_ts) {
                        visible.insert(key.clone(), row);
                    }
                }
            }
        }
        for ((c, s, key), row) in self.writes.lock().iter() {
            if *c != collection || *s != schema_name || !key_in_range(key, &start, &end) {
                continue;
            }
            match row {
                Some(row) => visible.insert(key.clone(), row.clone()),
                None => visible.remove(key),
            };
        }

        let continuation = query.continuation().cloned();
        let after = |key: &Bytes| match &continuation {
            None => true,
            Some(c) if query.is_reverse() => key < c,
            Some(c) => key > c,
        };
        let rows: Box<dyn Iterator<Item = (&Bytes, &StoredRow)>> = if query.is_reverse() {
            Box::new(visible.iter().rev())
        } else {
            Box::new(visible.iter())
        };

        let limit = query.limit().and_then(|l| usize::try_from(l).ok()).filter(|l| *l > 0);
        let mut records = Vec::new();
        let mut last_key = None;
        let mut done = true;
        for (key, row) in rows.filter(|(k, _)| after(*k)) {
            let record = match SkvRecord::from_values(&collection, Arc::clone(&row.schema), row.values.clone()) {
                Ok(record) => record,
                Err(e) => return SkvResponse::status(SkvStatus::internal_error(e.to_string())),
            };
            if query.filter().is_some_and(|f| !f.matches(&record)) {
                continue;
            }
            if limit.is_some_and(|l| records.len() >= l) {
                done = false;
                break;
            }
            records.push(record.project(query.projection()));
            last_key = Some(key.clone());
        }
        drop(state);

        query.set_continuation(last_key.or(continuation), done);
        SkvResponse::ok(ScanPage { query, records })
    }

    async fn end(&self, commit: bool) -> SkvStatus {
        {
            let mut state = self.state.lock();
            if *state != TxnState::Active {
                return SkvStatus::gone(format!("transaction {} already ended", self.id));
            }
            if commit && Instant::now() > self.deadline {
                *state = TxnState::Aborted;
                self.writes.lock().clear();
                return SkvStatus::request_timeout(format!(
                    "transaction {} exceeded its deadline",
                    self.id
                ));
            }
        }

        let status = if commit {
            self.commit()
        } else {
            self.writes.lock().clear();
            debug!(txn = self.id, "aborted");
            SkvStatus::ok()
        };
        *self.state.lock() = if commit && status.is_2xx() {
            TxnState::Committed
        } else {
            TxnState::Aborted
        };
        status
    }
}
