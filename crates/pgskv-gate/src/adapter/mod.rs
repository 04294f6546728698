//! Request adapter.
//!
//! Turns relational operations into key-value requests and runs them on a
//! bounded worker pool:
//!
//! ```text
//!  PgOp ──validate──▶ worker pool ──▶ schema (cached) ──┬─ row id ──▶ point read
//!                                                      ├─ read ────▶ range ─▶ scan page
//!                                                      └─ write ───▶ record ─▶ write / partial update
//!                                                                         │
//!  OpFuture ◀───────────────── status translation ◀─────── bridge ◀───────┘
//! ```
//!
//! Malformed requests are rejected before anything is dispatched. Once an
//! operation is dispatched its future always completes.

mod expr;
mod ops;
mod pool;
mod range;
mod status;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use pgskv_common::config::CollectionConfig;
use pgskv_common::{GateConfig, GateError, GateResult, TxnId, SKV_FIELD_OFFSET};
use pgskv_store::dto::decode_key;
use pgskv_store::{
    CollectionCapacity, CollectionCreateRequest, CollectionMetadata, HashScheme, Key, Query,
    ScanPage, Schema, SkvClient, SkvRecord, SkvStatus, StorageDriver, TxnOptions,
};
use tracing::{debug, info};

use crate::bridge::{Pending, SkvBridge};
use crate::entity::TableDesc;

pub use expr::{ExprOpcode, SqlOpCondition, SqlOpExpr, SqlValue};
pub use ops::{
    ColumnValue, PagingState, PgOp, ReadOp, SqlOpReadRequest, SqlOpResponse, SqlOpWriteRequest,
    StmtType, WriteOp,
};
pub use range::parse_cond_expr_as_range;
pub use status::{check_status, into_value, request_status, OpKind};

use pool::WorkerPool;

/// Eventual result of an operation handed to [`Adapter::exec`].
pub type OpFuture = Pending<GateResult<PgOp>>;

/// (collection, schema name, version)
type SchemaKey = (String, String, u32);

/// Entry point for every key-value request the gate makes.
pub struct Adapter {
    inner: Arc<AdapterInner>,
    pool: WorkerPool,
}

struct AdapterInner {
    bridge: Arc<SkvBridge>,
    config: GateConfig,
    schemas: RwLock<HashMap<SchemaKey, Arc<Schema>>>,
}

impl Adapter {
    /// Creates an adapter over a running bridge.
    pub fn new(bridge: Arc<SkvBridge>, config: GateConfig) -> GateResult<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.worker_threads, config.max_in_flight_ops)?;
        info!(
            worker_threads = config.worker_threads,
            max_in_flight_ops = config.max_in_flight_ops,
            "adapter started"
        );
        let inner = AdapterInner { bridge, config, schemas: RwLock::new(HashMap::new()) };
        Ok(Self { inner: Arc::new(inner), pool })
    }

    /// Starts a bridge over `client` and an adapter over it.
    pub fn start(client: Arc<dyn SkvClient>, config: GateConfig) -> GateResult<Self> {
        let bridge = SkvBridge::start(client)?;
        Self::new(Arc::new(bridge), config)
    }

    /// The bridge requests go through.
    #[must_use]
    pub fn bridge(&self) -> &Arc<SkvBridge> {
        &self.inner.bridge
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.inner.config
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Begins a transaction that fails every operation after `timeout`.
    pub fn begin_transaction(&self, timeout: Duration) -> Pending<GateResult<TxnId>> {
        let inner = Arc::clone(&self.inner);
        self.pool.spawn(async move {
            let txn = into_value(inner.bridge.begin_txn(TxnOptions { timeout }).await)?;
            debug!(%txn, ?timeout, "began transaction");
            Ok(txn)
        })
    }

    /// Commits or aborts a transaction.
    pub fn end_transaction(&self, txn: TxnId, commit: bool) -> Pending<GateResult<()>> {
        let inner = Arc::clone(&self.inner);
        self.pool.spawn(async move {
            let status = inner.bridge.end_txn(txn, commit).await;
            check_status(&status, OpKind::Other)
        })
    }

    // =========================================================================
    // Collections and Schemas
    // =========================================================================

    /// Creates the collection backing a database, using the configured
    /// partitioning and capacity defaults.
    ///
    /// The raw status is returned so callers can treat an existing
    /// collection (409) as success.
    pub fn create_collection(&self, name: &str, namespace_name: &str) -> GateResult<Pending<SkvStatus>> {
        let request = collection_request(&self.inner.config.collection, name)?;
        info!(
            collection = name,
            namespace = namespace_name,
            scheme = ?request.metadata.hash_scheme,
            "creating collection"
        );
        Ok(self.inner.bridge.create_collection(request))
    }

    /// Fetches a schema; `None` fetches the latest version.
    ///
    /// Versions are immutable, so fetched schemas are cached.
    pub fn get_schema(
        &self,
        collection: &str,
        schema_name: &str,
        version: Option<u32>,
    ) -> Pending<GateResult<Arc<Schema>>> {
        let inner = Arc::clone(&self.inner);
        let (collection, schema_name) = (collection.to_string(), schema_name.to_string());
        self.pool.spawn(async move { inner.schema(&collection, &schema_name, version).await })
    }

    /// Creates a schema version.
    pub fn create_schema(&self, collection: &str, schema: Schema) -> Pending<GateResult<()>> {
        let inner = Arc::clone(&self.inner);
        let collection = collection.to_string();
        self.pool.spawn(async move {
            let (name, version) = (schema.name.clone(), schema.version);
            let status = inner.bridge.create_schema(&collection, schema).await;
            check_status(&status, OpKind::Other)?;
            debug!(%collection, schema = %name, version, "created schema");
            Ok(())
        })
    }

    /// Creates an unbounded scan over the latest version of a schema.
    pub fn create_scan_read(&self, collection: &str, schema_name: &str) -> Pending<GateResult<Query>> {
        let inner = Arc::clone(&self.inner);
        let (collection, schema_name) = (collection.to_string(), schema_name.to_string());
        self.pool.spawn(async move {
            into_value(inner.bridge.create_scan_read(&collection, &schema_name).await)
        })
    }

    // =========================================================================
    // Records
    // =========================================================================

    /// Reads the record whose key fields are set; a missing record is `None`.
    pub fn read_record(&self, txn: TxnId, record: SkvRecord) -> Pending<GateResult<Option<SkvRecord>>> {
        let inner = Arc::clone(&self.inner);
        self.pool.spawn(async move {
            match inner.bridge.read(txn, record).await.into_result() {
                Ok(record) => Ok(Some(record)),
                Err(status) => check_status(&status, OpKind::Read).map(|()| None),
            }
        })
    }

    /// Writes or erases a full record.
    pub fn write_record(
        &self,
        txn: TxnId,
        record: SkvRecord,
        erase: bool,
        reject_if_exists: bool,
    ) -> Pending<GateResult<()>> {
        let inner = Arc::clone(&self.inner);
        self.pool.spawn(async move {
            let status = inner.bridge.write(txn, record, erase, reject_if_exists).await;
            check_status(&status, OpKind::Other)
        })
    }

    /// Reads the next page of `query`.
    pub fn scan_page(&self, txn: TxnId, query: Query) -> Pending<GateResult<ScanPage>> {
        let inner = Arc::clone(&self.inner);
        self.pool.spawn(async move { into_value(inner.bridge.scan_read(txn, query).await) })
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Dispatches a relational operation within `txn`.
    ///
    /// Request shapes the adapter cannot serve fail here, before dispatch.
    pub fn exec(&self, txn: TxnId, op: PgOp) -> GateResult<OpFuture> {
        validate(&op)?;
        let inner = Arc::clone(&self.inner);
        Ok(self.pool.spawn(async move {
            match op {
                PgOp::Read(op) => inner.execute_read(txn, op).await.map(PgOp::Read),
                PgOp::Write(op) => inner.execute_write(txn, op).await.map(PgOp::Write),
            }
        }))
    }

    /// Encodes the key of a row of `table` from its key column values.
    ///
    /// Blocks on the schema fetch; call it from a plain thread.
    pub fn get_row_id(&self, table: &TableDesc, key_values: &[SqlValue]) -> GateResult<Bytes> {
        let schema = self
            .get_schema(table.collection(), table.table_id(), Some(table.schema_version()))
            .wait()?;
        encode_row_id(table.collection(), schema, key_values)
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("bridge", &self.inner.bridge)
            .field("cached_schemas", &self.inner.schemas.read().len())
            .finish()
    }
}

impl AdapterInner {
    async fn schema(
        &self,
        collection: &str,
        schema_name: &str,
        version: Option<u32>,
    ) -> GateResult<Arc<Schema>> {
        if let Some(version) = version {
            let key = (collection.to_string(), schema_name.to_string(), version);
            let cached = self.schemas.read().get(&key).cloned();
            if let Some(schema) = cached {
                return Ok(schema);
            }
        }
        let schema = into_value(self.bridge.get_schema(collection, schema_name, version).await)?;
        self.schemas.write().insert(
            (collection.to_string(), schema_name.to_string(), schema.version),
            Arc::clone(&schema),
        );
        Ok(schema)
    }

    async fn execute_read(&self, txn: TxnId, mut op: ReadOp) -> GateResult<ReadOp> {
        let request = &op.request;
        let schema =
            self.schema(&request.collection, &request.table_id, Some(request.schema_version)).await?;
        let projection = projection(&schema, &request.targets)?;

        if let Some(row_id) = &request.row_id {
            let key = Key::new(request.table_id.clone(), row_id.clone());
            let rows = match self.bridge.read_key(txn, &request.collection, key).await.into_result() {
                Ok(record) => vec![record.project(&projection)],
                Err(status) => {
                    check_status(&status, OpKind::Read)?;
                    Vec::new()
                }
            };
            op.response = SqlOpResponse { rows, paging_state: None, rows_affected_count: 0 };
            return Ok(op);
        }

        let (mut query, rows_read) = match &request.paging_state {
            Some(state) => (state.query.clone(), state.total_num_rows_read()),
            None => (build_scan(request, schema, &projection)?, 0),
        };
        let limit = if request.limit > 0 { request.limit } else { self.config.default_page_limit };
        query.set_limit((limit > 0).then_some(limit));

        let ScanPage { query, records } = match self.bridge.scan_read(txn, query).await.into_result() {
            Ok(page) => page,
            Err(status) => {
                check_status(&status, OpKind::Read)?;
                op.response = SqlOpResponse::default();
                return Ok(op);
            }
        };
        let total = rows_read + records.len() as u64;
        debug!(table = %request.table_id, rows = records.len(), total, done = query.is_done(), "scan page");
        let paging_state = (!query.is_done()).then(|| PagingState::new(query, total));
        op.response = SqlOpResponse { rows: records, paging_state, rows_affected_count: 0 };
        Ok(op)
    }

    async fn execute_write(&self, txn: TxnId, mut op: WriteOp) -> GateResult<WriteOp> {
        let request = &op.request;
        let schema =
            self.schema(&request.collection, &request.table_id, Some(request.schema_version)).await?;
        let (record, action) = build_write(request, schema)?;
        let status = match action {
            WriteAction::Write { erase, reject_if_exists } => {
                self.bridge.write(txn, record, erase, reject_if_exists).await
            }
            WriteAction::PartialUpdate { fields, key } => {
                self.bridge.partial_update(txn, record, fields, key).await
            }
        };
        check_status(&status, OpKind::Other)?;
        op.response.rows_affected_count = 1;
        Ok(op)
    }
}

// =============================================================================
// Request Translation
// =============================================================================

fn validate(op: &PgOp) -> GateResult<()> {
    match op {
        PgOp::Read(op) => {
            if op.request.where_expr.is_some() {
                return Err(GateError::not_supported("where clause pushdown on reads"));
            }
            if op.request.targets.iter().any(|t| !matches!(t, SqlOpExpr::ColumnRef(_))) {
                return Err(GateError::not_supported("read targets other than column references"));
            }
        }
        PgOp::Write(op) => {
            let request = &op.request;
            match request.stmt_type {
                StmtType::Truncate => return Err(GateError::not_supported("truncate")),
                StmtType::Select => {
                    return Err(GateError::usage("a select cannot be dispatched as a write"))
                }
                _ => {}
            }
            if !request.targets.is_empty()
                || request.where_expr.is_some()
                || request.condition_expr.is_some()
            {
                return Err(GateError::usage(
                    "targets, where clauses and condition expressions are not allowed on writes",
                ));
            }
        }
    }
    Ok(())
}

fn collection_request(config: &CollectionConfig, name: &str) -> GateResult<CollectionCreateRequest> {
    let storage_driver = StorageDriver::from_tag(&config.storage_driver).ok_or_else(|| {
        GateError::config(format!("unknown storage driver {}", config.storage_driver))
    })?;
    let hash_scheme =
        if config.range_ends.is_empty() { HashScheme::HashCrc32c } else { HashScheme::Range };
    Ok(CollectionCreateRequest {
        metadata: CollectionMetadata {
            name: name.to_string(),
            hash_scheme,
            storage_driver,
            capacity: CollectionCapacity {
                data_capacity_mb: config.capacity.data_capacity_mb,
                read_iops: config.capacity.read_iops,
                write_iops: config.capacity.write_iops,
            },
            retention_period: config.retention,
        },
        cluster_endpoints: Vec::new(),
        range_ends: config.range_ends.clone(),
    })
}

/// Field names for read targets; empty means every field.
fn projection(schema: &Schema, targets: &[SqlOpExpr]) -> GateResult<Vec<String>> {
    targets
        .iter()
        .map(|target| match target {
            SqlOpExpr::ColumnRef(id) => usize::try_from(*id)
                .ok()
                .and_then(|pos| schema.fields.get(pos + SKV_FIELD_OFFSET))
                .map(|field| field.name.clone())
                .ok_or_else(|| {
                    GateError::invalid_argument(format!(
                        "target column {id} is not a field of {}",
                        schema.name
                    ))
                }),
            _ => Err(GateError::not_supported("read targets other than column references")),
        })
        .collect()
}

fn literal<'a>(expr: &'a SqlOpExpr, what: &str) -> GateResult<&'a SqlValue> {
    expr.as_value().ok_or_else(|| GateError::usage(format!("{what} must be a literal")))
}

/// Builds the first-page query of a scan.
fn build_scan(request: &SqlOpReadRequest, schema: Arc<Schema>, projection: &[String]) -> GateResult<Query> {
    let mut start = SkvRecord::new(request.collection.as_str(), Arc::clone(&schema));
    let mut end = SkvRecord::new(request.collection.as_str(), Arc::clone(&schema));
    for expr in &request.key_column_values {
        let value = literal(expr, "key column value")?;
        range::serialize_value(value, &mut start)?;
        range::serialize_value(value, &mut end)?;
    }
    if let Some(condition) = &request.condition_expr {
        let branched = parse_cond_expr_as_range(condition, &mut start, &mut end)?;
        debug!(table = %request.table_id, branched, "derived scan range");
    }

    let mut query = Query::new(request.collection.as_str(), schema);
    for name in projection {
        query.add_projection(name.as_str());
    }
    query.set_bounds(start, end);
    query.set_reverse_direction(!request.is_forward_scan);
    Ok(query)
}

#[derive(Debug, PartialEq)]
enum WriteAction {
    Write { erase: bool, reject_if_exists: bool },
    PartialUpdate { fields: Vec<usize>, key: Option<Key> },
}

/// Builds the record and write flavour for a write request.
fn build_write(request: &SqlOpWriteRequest, schema: Arc<Schema>) -> GateResult<(SkvRecord, WriteAction)> {
    let mut record = SkvRecord::new(request.collection.as_str(), Arc::clone(&schema));
    match &request.row_id {
        Some(row_id) => {
            for value in decode_key(&schema, row_id)? {
                record.serialize_next_optional(value)?;
            }
        }
        None => {
            for expr in &request.key_column_values {
                range::serialize_value(literal(expr, "key column value")?, &mut record)?;
            }
        }
    }
    if record.cursor() != schema.num_key_fields() + SKV_FIELD_OFFSET {
        return Err(GateError::usage(format!(
            "write to {} sets {} key fields, expected {}",
            schema.name,
            record.cursor(),
            schema.num_key_fields()
        )));
    }

    let is_update = request.stmt_type == StmtType::Update;
    let values = if is_update { &request.column_new_values } else { &request.column_values };
    let mut values: Vec<&ColumnValue> = values.iter().collect();
    values.sort_by_key(|v| v.column_id);

    let mut fields = Vec::with_capacity(values.len());
    for value in values {
        if value.column_id < record.cursor() {
            return Err(GateError::usage(format!(
                "field {} of {} is a key field or is set twice",
                value.column_id, schema.name
            )));
        }
        while record.cursor() < value.column_id {
            record.skip_next()?;
        }
        range::serialize_value(literal(&value.expr, "column value")?, &mut record)?;
        fields.push(value.column_id);
    }

    let action = if is_update {
        let key = request.row_id.clone().map(|id| Key::new(schema.name.clone(), id));
        WriteAction::PartialUpdate { fields, key }
    } else {
        WriteAction::Write {
            erase: request.stmt_type == StmtType::Delete,
            reject_if_exists: request.stmt_type == StmtType::Insert,
        }
    };
    Ok((record, action))
}

/// Encodes the key of the row whose key fields are `key_values`.
fn encode_row_id(collection: &str, schema: Arc<Schema>, key_values: &[SqlValue]) -> GateResult<Bytes> {
    if key_values.len() != schema.num_key_fields() {
        return Err(GateError::invalid_argument(format!(
            "row id of {} needs {} key values, got {}",
            schema.name,
            schema.num_key_fields(),
            key_values.len()
        )));
    }
    let mut record = SkvRecord::new(collection, schema);
    for value in key_values {
        range::serialize_value(value, &mut record)?;
    }
    Ok(record.key().partition_key)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use pgskv_common::RequestStatus;
    use pgskv_store::{FieldType, FieldValue, MemoryStore, SchemaField};

    use super::*;

    const COLL: &str = "adapter_test";

    fn schema() -> Schema {
        Schema::new("t", 1)
            .with_field(SchemaField::new("k0", FieldType::Int32))
            .with_field(SchemaField::new("k1", FieldType::Int32))
            .with_field(SchemaField::new("v", FieldType::String))
            .with_field(SchemaField::new("n", FieldType::Int64))
            .with_partition_key(vec![0, 1])
    }

    fn setup() -> (Adapter, Arc<MemoryStore>) {
        let store = MemoryStore::shared();
        let adapter = Adapter::start(store.clone(), GateConfig::for_testing()).unwrap();
        assert!(adapter.create_collection(COLL, "db").unwrap().wait().is_2xx());
        adapter.create_schema(COLL, schema()).wait().unwrap();
        (adapter, store)
    }

    fn begin(adapter: &Adapter) -> TxnId {
        adapter.begin_transaction(Duration::from_secs(5)).wait().unwrap()
    }

    fn insert(k0: i32, k1: i32, v: &str) -> SqlOpWriteRequest {
        let mut request = SqlOpWriteRequest::new(COLL, "t", 1, StmtType::Insert);
        request.key_column_values = vec![SqlOpExpr::value(k0), SqlOpExpr::value(k1)];
        request.column_values = vec![ColumnValue::new(2, SqlOpExpr::value(v))];
        request
    }

    fn run(adapter: &Adapter, txn: TxnId, op: PgOp) -> GateResult<SqlOpResponse> {
        adapter.exec(txn, op)?.wait().map(PgOp::into_response)
    }

    #[test]
    fn test_write_flags_by_statement() {
        let schema = Arc::new(schema());
        let (_, action) = build_write(&insert(1, 2, "a"), Arc::clone(&schema)).unwrap();
        assert_eq!(action, WriteAction::Write { erase: false, reject_if_exists: true });

        let mut delete = insert(1, 2, "a");
        delete.stmt_type = StmtType::Delete;
        let (_, action) = build_write(&delete, Arc::clone(&schema)).unwrap();
        assert_eq!(action, WriteAction::Write { erase: true, reject_if_exists: false });

        let mut upsert = insert(1, 2, "a");
        upsert.stmt_type = StmtType::Upsert;
        let (_, action) = build_write(&upsert, schema).unwrap();
        assert_eq!(action, WriteAction::Write { erase: false, reject_if_exists: false });
    }

    #[test]
    fn test_update_fields_are_sorted_and_skipped() {
        let schema = Arc::new(schema());
        let mut update = SqlOpWriteRequest::new(COLL, "t", 1, StmtType::Update);
        update.key_column_values = vec![SqlOpExpr::value(1), SqlOpExpr::value(2)];
        update.column_new_values =
            vec![ColumnValue::new(3, SqlOpExpr::value(9)), ColumnValue::new(2, SqlOpExpr::value("x"))];
        let (record, action) = build_write(&update, Arc::clone(&schema)).unwrap();
        assert_eq!(action, WriteAction::PartialUpdate { fields: vec![2, 3], key: None });
        assert_eq!(record.field(3), Some(&FieldValue::Int64(9)));

        update.column_new_values = vec![ColumnValue::new(3, SqlOpExpr::value(4))];
        let (record, action) = build_write(&update, schema).unwrap();
        assert_eq!(action, WriteAction::PartialUpdate { fields: vec![3], key: None });
        assert_eq!(record.field(2), None);
    }

    #[test]
    fn test_update_of_key_field_is_rejected() {
        let mut update = SqlOpWriteRequest::new(COLL, "t", 1, StmtType::Update);
        update.key_column_values = vec![SqlOpExpr::value(1), SqlOpExpr::value(2)];
        update.column_new_values = vec![ColumnValue::new(1, SqlOpExpr::value(3))];
        assert!(matches!(build_write(&update, Arc::new(schema())), Err(GateError::Usage { .. })));

        let mut partial_key = insert(1, 2, "a");
        partial_key.key_column_values.pop();
        assert!(matches!(build_write(&partial_key, Arc::new(schema())), Err(GateError::Usage { .. })));
    }

    #[test]
    fn test_invalid_requests_fail_before_dispatch() {
        let (adapter, _) = setup();
        let txn = begin(&adapter);

        let mut with_where = insert(1, 1, "a");
        with_where.where_expr = Some(SqlOpExpr::value(true));
        assert!(matches!(adapter.exec(txn, PgOp::write(with_where)), Err(GateError::Usage { .. })));

        let mut with_targets = insert(1, 1, "a");
        with_targets.targets = vec![SqlOpExpr::column(0)];
        assert!(adapter.exec(txn, PgOp::write(with_targets)).is_err());

        let truncate = SqlOpWriteRequest::new(COLL, "t", 1, StmtType::Truncate);
        assert!(matches!(
            adapter.exec(txn, PgOp::write(truncate)),
            Err(GateError::NotSupported { .. })
        ));

        let mut read = SqlOpReadRequest::new(COLL, "t", 1);
        read.where_expr = Some(SqlOpExpr::value(true));
        assert!(matches!(adapter.exec(txn, PgOp::read(read)), Err(GateError::NotSupported { .. })));

        let mut read = SqlOpReadRequest::new(COLL, "t", 1);
        read.targets = vec![SqlOpExpr::value(1)];
        assert!(matches!(adapter.exec(txn, PgOp::read(read)), Err(GateError::NotSupported { .. })));
    }

    #[test]
    fn test_duplicate_insert() {
        let (adapter, _) = setup();
        let txn = begin(&adapter);
        let response = run(&adapter, txn, PgOp::write(insert(1, 1, "a"))).unwrap();
        assert_eq!(response.rows_affected_count, 1);

        let err = run(&adapter, txn, PgOp::write(insert(1, 1, "b"))).unwrap_err();
        assert!(matches!(err, GateError::DuplicateKey { .. }));
        assert_eq!(err.request_status(), RequestStatus::DuplicateKey);
    }

    #[test]
    fn test_point_read_by_row_id() {
        let (adapter, _) = setup();
        let txn = begin(&adapter);
        run(&adapter, txn, PgOp::write(insert(4, 2, "four-two"))).unwrap();

        let schema = Arc::new(schema());
        let row_id =
            encode_row_id(COLL, Arc::clone(&schema), &[SqlValue::Int(4), SqlValue::Int(2)]).unwrap();
        let mut read = SqlOpReadRequest::new(COLL, "t", 1);
        read.row_id = Some(row_id);
        read.targets = vec![SqlOpExpr::column(2)];
        let response = run(&adapter, txn, PgOp::read(read)).unwrap();
        assert_eq!(response.rows.len(), 1);
        assert_eq!(response.rows[0].field(2), Some(&FieldValue::from("four-two")));
        assert_eq!(response.rows[0].field(0), None);

        let missing = encode_row_id(COLL, schema, &[SqlValue::Int(4), SqlValue::Int(3)]).unwrap();
        let mut read = SqlOpReadRequest::new(COLL, "t", 1);
        read.row_id = Some(missing);
        assert!(run(&adapter, txn, PgOp::read(read)).unwrap().rows.is_empty());
    }

    #[test]
    fn test_update_and_delete_by_row_id() {
        let (adapter, store) = setup();
        let txn = begin(&adapter);
        run(&adapter, txn, PgOp::write(insert(1, 1, "old"))).unwrap();
        let row_id = encode_row_id(COLL, Arc::new(schema()), &[SqlValue::Int(1), SqlValue::Int(1)])
            .unwrap();

        let mut update = SqlOpWriteRequest::new(COLL, "t", 1, StmtType::Update);
        update.row_id = Some(row_id.clone());
        update.column_new_values = vec![ColumnValue::new(3, SqlOpExpr::value(10))];
        run(&adapter, txn, PgOp::write(update)).unwrap();

        let mut read = SqlOpReadRequest::new(COLL, "t", 1);
        read.row_id = Some(row_id.clone());
        let rows = run(&adapter, txn, PgOp::read(read)).unwrap().rows;
        assert_eq!(rows[0].field(2), Some(&FieldValue::from("old")));
        assert_eq!(rows[0].field(3), Some(&FieldValue::Int64(10)));

        let mut delete = SqlOpWriteRequest::new(COLL, "t", 1, StmtType::Delete);
        delete.row_id = Some(row_id);
        run(&adapter, txn, PgOp::write(delete)).unwrap();
        adapter.end_transaction(txn, true).wait().unwrap();
        assert_eq!(store.row_count(COLL, "t"), 0);
    }

    #[test]
    fn test_pagination_is_page_size_invariant() {
        let (adapter, _) = setup();
        let txn = begin(&adapter);
        for k1 in 0..10 {
            run(&adapter, txn, PgOp::write(insert(1, k1, "in"))).unwrap();
            run(&adapter, txn, PgOp::write(insert(2, k1, "out"))).unwrap();
        }
        adapter.end_transaction(txn, true).wait().unwrap();

        let txn = begin(&adapter);
        let scan = |limit: u64| {
            let mut keys = Vec::new();
            let mut paging_state = None;
            loop {
                let mut read = SqlOpReadRequest::new(COLL, "t", 1);
                read.condition_expr = Some(SqlOpExpr::and(vec![
                    SqlOpExpr::compare(ExprOpcode::Eq, 0, 1),
                    SqlOpExpr::compare(ExprOpcode::Ge, 1, 3),
                ]));
                read.limit = limit;
                read.paging_state = paging_state.take();
                let response = run(&adapter, txn, PgOp::read(read)).unwrap();
                keys.extend(response.rows.iter().map(|r| r.field(1).cloned()));
                match response.paging_state {
                    Some(state) => paging_state = Some(state),
                    None => return keys,
                }
            }
        };
        let expected: Vec<_> = (3..10).map(|k| Some(FieldValue::Int32(k))).collect();
        for limit in [1, 2, 3, 7, 100] {
            assert_eq!(scan(limit), expected, "limit {limit}");
        }
        let unique: BTreeSet<_> = scan(2).into_iter().map(|k| format!("{k:?}")).collect();
        assert_eq!(unique.len(), 7);
    }

    #[test]
    fn test_reverse_scan_with_key_prefix() {
        let (adapter, _) = setup();
        let txn = begin(&adapter);
        for k1 in 0..4 {
            run(&adapter, txn, PgOp::write(insert(7, k1, "r"))).unwrap();
        }
        let mut read = SqlOpReadRequest::new(COLL, "t", 1);
        read.key_column_values = vec![SqlOpExpr::value(7)];
        read.is_forward_scan = false;
        let rows = run(&adapter, txn, PgOp::read(read)).unwrap().rows;
        let keys: Vec<_> = rows.iter().map(|r| r.field(1).cloned()).collect();
        assert_eq!(keys, (0..4).rev().map(|k| Some(FieldValue::Int32(k))).collect::<Vec<_>>());
    }

    #[test]
    fn test_substrate_failures_are_translated() {
        let (adapter, store) = setup();
        let txn = begin(&adapter);
        store.inject_fault(SkvStatus::conflict("injected"));
        let err = run(&adapter, txn, PgOp::write(insert(1, 1, "a"))).unwrap_err();
        assert!(matches!(err, GateError::RestartRequired { .. }));
        assert!(err.is_retryable());

        let ghost = TxnId::new(4242);
        let err = run(&adapter, ghost, PgOp::read(SqlOpReadRequest::new(COLL, "t", 1))).unwrap_err();
        assert!(matches!(err, GateError::InvalidTransaction { .. }));
        assert_eq!(err.request_status(), RequestStatus::UsageError);
    }

    #[test]
    fn test_collection_request_from_config() {
        let mut config = GateConfig::default().collection;
        let request = collection_request(&config, "db").unwrap();
        assert_eq!(request.metadata.hash_scheme, HashScheme::Range);
        assert_eq!(request.metadata.storage_driver, StorageDriver::K23si);

        config.range_ends.clear();
        config.capacity.write_iops = Some(5);
        let request = collection_request(&config, "db").unwrap();
        assert_eq!(request.metadata.hash_scheme, HashScheme::HashCrc32c);
        assert_eq!(request.metadata.capacity.write_iops, Some(5));

        config.storage_driver = "rocks".into();
        assert!(matches!(collection_request(&config, "db"), Err(GateError::Config { .. })));
    }
}
