//! Catalog persistence.
//!
//! Tables and indexes are stored as records of the three sys schemas in the
//! collection of their database:
//!
//! ```text
//!  TableInfo ──┬─ head record ───────────────▶ K2RESVD_SCHEMA_SQL_TABLE_HEAD
//!              ├─ column records ────────────▶ K2RESVD_SCHEMA_SQL_TABLE_COLUMN_META
//!              └─ per index: head record ────▶ K2RESVD_SCHEMA_SQL_TABLE_HEAD
//!                            column records ─▶ K2RESVD_SCHEMA_SQL_INDEX_COLUMN_META
//! ```
//!
//! Record reads and writes run inside the caller's transaction. Key-value
//! schemas are not transactional and are created on first use.

use std::sync::Arc;

use pgskv_common::{
    GateError, GateResult, TxnId, SYS_INDEX_COLUMN_SCHEMA, SYS_SCHEMA_VERSION,
    SYS_TABLE_COLUMN_SCHEMA, SYS_TABLE_HEAD_SCHEMA,
};
use pgskv_store::{FieldValue, Filter, ScanPage, Schema, SkvRecord};
use tracing::{debug, error, info, warn};

use super::codec::{
    build_index_info, build_table_info, decode_table_head, head_key_record, index_column_records,
    index_head_record, table_column_records, table_head_record, TableHead,
};
use super::sys_tables::{sys_schemas, INDEXED_TABLE_ID, IS_INDEX};
use crate::adapter::Adapter;
use crate::entity::{IndexInfo, IndexPermissions, TableInfo};
use crate::mapper::{derive_index_schema, derive_table_schema};

/// Reads and writes catalog records through the adapter.
///
/// Every call blocks until the substrate answers, so it must not be made
/// from inside an async runtime.
#[derive(Debug, Clone)]
pub struct CatalogHandler {
    adapter: Arc<Adapter>,
}

impl CatalogHandler {
    /// Creates a handler over `adapter`.
    #[must_use]
    pub fn new(adapter: Arc<Adapter>) -> Self {
        Self { adapter }
    }

    // =========================================================================
    // Bootstrap
    // =========================================================================

    /// Creates whichever sys schemas `collection` lacks.
    ///
    /// Only a missing schema leads to creation; any other failure to fetch
    /// one is returned, since the catalog cannot work without them.
    pub fn check_and_create_sys_tables_if_necessary(&self, collection: &str) -> GateResult<()> {
        for schema in sys_schemas() {
            let name = schema.name.clone();
            if let Err(e) = self.create_schema_if_missing(collection, schema) {
                error!(%collection, schema = %name, error = %e, "sys table bootstrap failed");
                return Err(e);
            }
        }
        Ok(())
    }

    /// Returns true if the schema was created.
    fn create_schema_if_missing(&self, collection: &str, schema: Schema) -> GateResult<bool> {
        match self.adapter.get_schema(collection, &schema.name, Some(schema.version)).wait() {
            Ok(_) => return Ok(false),
            Err(GateError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        let (name, version) = (schema.name.clone(), schema.version);
        match self.adapter.create_schema(collection, schema).wait() {
            Ok(()) => {
                info!(%collection, schema = %name, version, "created schema");
                Ok(true)
            }
            // created concurrently since the fetch
            Err(GateError::RestartRequired { .. }) => {
                debug!(%collection, schema = %name, version, "schema already exists");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn sys_schema(&self, collection: &str, name: &str) -> GateResult<Arc<Schema>> {
        self.adapter.get_schema(collection, name, Some(SYS_SCHEMA_VERSION)).wait()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Persists `table` and all of its indexes.
    ///
    /// Creates the key-value schema of the table's current version and of
    /// each index if missing, then replaces the table's catalog records.
    pub fn create_or_update_table(&self, txn: TxnId, table: &TableInfo) -> GateResult<()> {
        let collection = table.namespace_id.as_str();
        self.create_schema_if_missing(collection, derive_table_schema(table)?)?;

        let head_schema = self.sys_schema(collection, SYS_TABLE_HEAD_SCHEMA)?;
        let column_schema = self.sys_schema(collection, SYS_TABLE_COLUMN_SCHEMA)?;

        // column records of dropped columns must not survive an update
        for record in self.scan_all(txn, collection, SYS_TABLE_COLUMN_SCHEMA, Some(&table.table_id), None)? {
            self.erase(txn, record)?;
        }
        self.put(txn, table_head_record(collection, head_schema, table)?)?;
        for record in table_column_records(collection, &column_schema, table)? {
            self.put(txn, record)?;
        }
        for index in table.indexes.values() {
            self.persist_index_table(txn, table, index)?;
        }

        debug!(
            table = %table.table_id,
            name = %table.table_name,
            version = table.schema_version(),
            indexes = table.indexes.len(),
            "persisted table"
        );
        Ok(())
    }

    /// Persists one index of `table`, creating its key-value schema if
    /// missing.
    pub fn persist_index_table(&self, txn: TxnId, table: &TableInfo, index: &IndexInfo) -> GateResult<()> {
        let collection = table.namespace_id.as_str();
        self.create_schema_if_missing(collection, derive_index_schema(index, &table.schema)?)?;

        let head_schema = self.sys_schema(collection, SYS_TABLE_HEAD_SCHEMA)?;
        let index_column_schema = self.sys_schema(collection, SYS_INDEX_COLUMN_SCHEMA)?;
        let head =
            index_head_record(collection, head_schema, index, table.is_sys_table, table.next_column_id)?;
        self.put(txn, head)?;
        for record in index_column_records(collection, &index_column_schema, index, &table.schema)? {
            self.put(txn, record)?;
        }
        debug!(index = %index.table_id, table = %table.table_id, permissions = %index.index_permissions, "persisted index");
        Ok(())
    }

    /// Moves an index of `table` to `permissions` and persists its head.
    ///
    /// Returns the updated index; `table` itself is left unchanged.
    pub fn update_index_permissions(
        &self,
        txn: TxnId,
        table: &TableInfo,
        index_id: &str,
        permissions: IndexPermissions,
    ) -> GateResult<IndexInfo> {
        let mut index = table
            .index(index_id)
            .cloned()
            .ok_or_else(|| GateError::not_found(format!("index {index_id} of {}", table.table_id)))?;
        index.transition_to(permissions)?;

        let collection = table.namespace_id.as_str();
        let head_schema = self.sys_schema(collection, SYS_TABLE_HEAD_SCHEMA)?;
        let head =
            index_head_record(collection, head_schema, &index, table.is_sys_table, table.next_column_id)?;
        self.put(txn, head)?;
        info!(index = %index_id, %permissions, "updated index permissions");
        Ok(index)
    }

    /// Erases the catalog records of `table` and its indexes.
    pub fn delete_table(&self, txn: TxnId, table: &TableInfo) -> GateResult<()> {
        let collection = table.namespace_id.as_str();
        for index_id in table.indexes.keys() {
            self.delete_index(txn, collection, index_id)?;
        }
        self.erase_table_records(txn, collection, &table.table_id, SYS_TABLE_COLUMN_SCHEMA)?;
        info!(table = %table.table_id, name = %table.table_name, "deleted table");
        Ok(())
    }

    /// Erases the catalog records of one index.
    pub fn delete_index(&self, txn: TxnId, collection: &str, index_id: &str) -> GateResult<()> {
        self.erase_table_records(txn, collection, index_id, SYS_INDEX_COLUMN_SCHEMA)?;
        info!(index = %index_id, "deleted index");
        Ok(())
    }

    fn erase_table_records(
        &self,
        txn: TxnId,
        collection: &str,
        table_id: &str,
        column_schema_name: &str,
    ) -> GateResult<()> {
        for record in self.scan_all(txn, collection, column_schema_name, Some(table_id), None)? {
            self.erase(txn, record)?;
        }
        let head_schema = self.sys_schema(collection, SYS_TABLE_HEAD_SCHEMA)?;
        self.erase(txn, head_key_record(collection, head_schema, table_id)?)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Returns true if a head record exists for `table_id`.
    pub fn check_table_exists(&self, txn: TxnId, collection: &str, table_id: &str) -> GateResult<bool> {
        Ok(self.read_head(txn, collection, table_id)?.is_some())
    }

    /// Loads a table with all of its indexes.
    pub fn get_table(
        &self,
        txn: TxnId,
        namespace_id: &str,
        namespace_name: &str,
        table_id: &str,
    ) -> GateResult<TableInfo> {
        let head = self
            .read_head(txn, namespace_id, table_id)?
            .ok_or_else(|| GateError::not_found(format!("table {table_id} in {namespace_name}")))?;
        self.load_table(txn, namespace_id, namespace_name, &head)
    }

    /// Loads every table of a database, optionally including sys tables.
    pub fn list_tables(
        &self,
        txn: TxnId,
        namespace_id: &str,
        namespace_name: &str,
        include_sys_tables: bool,
    ) -> GateResult<Vec<TableInfo>> {
        let filter = Filter::Eq { field: IS_INDEX.to_string(), value: FieldValue::Bool(false) };
        let mut tables = Vec::new();
        for record in self.scan_all(txn, namespace_id, SYS_TABLE_HEAD_SCHEMA, None, Some(filter))? {
            let head = decode_table_head(record)?;
            if head.is_sys_table && !include_sys_tables {
                continue;
            }
            tables.push(self.load_table(txn, namespace_id, namespace_name, &head)?);
        }
        Ok(tables)
    }

    fn read_head(&self, txn: TxnId, collection: &str, table_id: &str) -> GateResult<Option<TableHead>> {
        let head_schema = self.sys_schema(collection, SYS_TABLE_HEAD_SCHEMA)?;
        let key = head_key_record(collection, head_schema, table_id)?;
        self.adapter.read_record(txn, key).wait()?.map(decode_table_head).transpose()
    }

    fn load_table(
        &self,
        txn: TxnId,
        namespace_id: &str,
        namespace_name: &str,
        head: &TableHead,
    ) -> GateResult<TableInfo> {
        let columns =
            self.scan_all(txn, namespace_id, SYS_TABLE_COLUMN_SCHEMA, Some(&head.table_id), None)?;
        let mut table = build_table_info(namespace_id, namespace_name, head, columns)?;

        let filter = Filter::Eq {
            field: INDEXED_TABLE_ID.to_string(),
            value: FieldValue::from(head.table_id.as_str()),
        };
        for record in self.scan_all(txn, namespace_id, SYS_TABLE_HEAD_SCHEMA, None, Some(filter))? {
            let index_head = decode_table_head(record)?;
            let columns = self.scan_all(
                txn,
                namespace_id,
                SYS_INDEX_COLUMN_SCHEMA,
                Some(&index_head.table_id),
                None,
            )?;
            table.add_index(build_index_info(&index_head, columns)?)?;
        }
        Ok(table)
    }

    /// Reads every record of a sys schema, following pagination to the end.
    ///
    /// `table_id` narrows the scan to records whose leading key field
    /// equals it. Pages are capped at the configured default page limit.
    fn scan_all(
        &self,
        txn: TxnId,
        collection: &str,
        schema_name: &str,
        table_id: Option<&str>,
        filter: Option<Filter>,
    ) -> GateResult<Vec<SkvRecord>> {
        let mut query = self.adapter.create_scan_read(collection, schema_name).wait()?;
        if let Some(table_id) = table_id {
            let mut start = SkvRecord::new(collection, Arc::clone(query.schema()));
            start.serialize_next(table_id)?;
            let end = start.clone();
            query.set_bounds(start, end);
        }
        if let Some(filter) = filter {
            query.set_filter(filter);
        }
        let limit = self.adapter.config().default_page_limit;
        query.set_limit((limit > 0).then_some(limit));

        let mut records = Vec::new();
        let mut pages = 0usize;
        loop {
            let ScanPage { query: next, records: page } = self.adapter.scan_page(txn, query).wait()?;
            pages += 1;
            records.extend(page);
            if next.is_done() {
                break;
            }
            query = next;
        }
        if pages > 1 {
            debug!(%collection, schema = %schema_name, pages, rows = records.len(), "multi-page catalog scan");
        }
        Ok(records)
    }

    fn put(&self, txn: TxnId, record: SkvRecord) -> GateResult<()> {
        self.adapter.write_record(txn, record, false, false).wait()
    }

    fn erase(&self, txn: TxnId, record: SkvRecord) -> GateResult<()> {
        match self.adapter.write_record(txn, record, true, false).wait() {
            Err(GateError::NotFound { message }) => {
                warn!(%message, "catalog record already gone");
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pgskv_common::GateConfig;
    use pgskv_store::MemoryStore;

    use super::*;
    use crate::entity::{ColumnSchema, DataType, IndexColumn, SortingType, TableSchema};

    const COLL: &str = "catalog_test";

    fn setup() -> (CatalogHandler, Arc<Adapter>, Arc<MemoryStore>) {
        setup_with(GateConfig::for_testing())
    }

    fn setup_with(config: GateConfig) -> (CatalogHandler, Arc<Adapter>, Arc<MemoryStore>) {
        let store = MemoryStore::shared();
        let adapter = Arc::new(Adapter::start(store.clone(), config).unwrap());
        assert!(adapter.create_collection(COLL, "db").unwrap().wait().is_2xx());
        let handler = CatalogHandler::new(Arc::clone(&adapter));
        handler.check_and_create_sys_tables_if_necessary(COLL).unwrap();
        (handler, adapter, store)
    }

    fn in_txn<T>(adapter: &Adapter, f: impl FnOnce(TxnId) -> GateResult<T>) -> T {
        let txn = adapter.begin_transaction(Duration::from_secs(5)).wait().unwrap();
        let value = f(txn).unwrap();
        adapter.end_transaction(txn, true).wait().unwrap();
        value
    }

    fn user_tags(table_id: &str, name: &str) -> TableInfo {
        let schema = TableSchema::with_sequential_ids(
            vec![
                ColumnSchema::new("user_id", DataType::Int32).partition().with_order(1),
                ColumnSchema::new("tag_id", DataType::Int32).primary().with_order(2),
                ColumnSchema::new("name", DataType::String).with_order(3),
                ColumnSchema::new("enabled", DataType::Bool).with_order(4),
            ],
            1,
        )
        .unwrap();
        TableInfo::new(COLL, "db", table_id, name, 16384, schema)
    }

    fn wide_table(table_id: &str, name: &str, width: usize) -> TableInfo {
        let mut columns = vec![ColumnSchema::new("id", DataType::Int64).partition().with_order(1)];
        for i in 1..width {
            columns.push(ColumnSchema::new(format!("c{i}"), DataType::String).with_order(i as i32 + 1));
        }
        let schema = TableSchema::with_sequential_ids(columns, 1).unwrap();
        TableInfo::new(COLL, "db", table_id, name, 16500, schema)
    }

    fn name_index(table_id: &str) -> IndexInfo {
        let column = IndexColumn {
            column_id: 0,
            column_name: "name".into(),
            data_type: DataType::String,
            is_nullable: true,
            is_partition: true,
            order: 1,
            sorting_type: SortingType::NotSpecified,
            base_column_id: 2,
        };
        IndexInfo::new(format!("{table_id}_idx"), "name_idx", 16400, table_id, false, vec![column])
    }

    #[test]
    fn test_sys_table_bootstrap_is_idempotent() {
        let (handler, adapter, _store) = setup();
        handler.check_and_create_sys_tables_if_necessary(COLL).unwrap();
        for name in [SYS_TABLE_HEAD_SCHEMA, SYS_TABLE_COLUMN_SCHEMA, SYS_INDEX_COLUMN_SCHEMA] {
            let schema = adapter.get_schema(COLL, name, None).wait().unwrap();
            assert_eq!(schema.version, SYS_SCHEMA_VERSION);
        }
    }

    #[test]
    fn test_bootstrap_fails_without_collection() {
        let (handler, _adapter, _store) = setup();
        let err = handler.check_and_create_sys_tables_if_necessary("missing").unwrap_err();
        assert!(matches!(err, GateError::NotFound { .. }));
    }

    #[test]
    fn test_create_and_get_table_with_index() {
        let (handler, adapter, _store) = setup();
        let mut table = user_tags("t1", "user_tags");
        table.add_index(name_index("t1")).unwrap();
        in_txn(&adapter, |txn| handler.create_or_update_table(txn, &table));

        let loaded = in_txn(&adapter, |txn| handler.get_table(txn, COLL, "db", "t1"));
        assert_eq!(loaded, table);
        assert!(adapter.get_schema(COLL, "t1", Some(1)).wait().is_ok());
        assert!(adapter.get_schema(COLL, "t1_idx", Some(1)).wait().is_ok());
        assert!(in_txn(&adapter, |txn| handler.check_table_exists(txn, COLL, "t1")));
        assert!(!in_txn(&adapter, |txn| handler.check_table_exists(txn, COLL, "t9")));
    }

    #[test]
    fn test_get_missing_table() {
        let (handler, adapter, _store) = setup();
        let txn = adapter.begin_transaction(Duration::from_secs(5)).wait().unwrap();
        let err = handler.get_table(txn, COLL, "db", "nope").unwrap_err();
        assert!(matches!(err, GateError::NotFound { .. }));
    }

    #[test]
    fn test_index_head_is_not_a_table() {
        let (handler, adapter, _store) = setup();
        let mut table = user_tags("t1", "user_tags");
        table.add_index(name_index("t1")).unwrap();
        in_txn(&adapter, |txn| handler.create_or_update_table(txn, &table));

        let txn = adapter.begin_transaction(Duration::from_secs(5)).wait().unwrap();
        let err = handler.get_table(txn, COLL, "db", "t1_idx").unwrap_err();
        assert!(matches!(err, GateError::Corruption { .. }));
    }

    #[test]
    fn test_update_drops_stale_columns() {
        let (handler, adapter, _store) = setup();
        let mut table = user_tags("t1", "user_tags");
        in_txn(&adapter, |txn| handler.create_or_update_table(txn, &table));

        table.drop_column("enabled").unwrap();
        in_txn(&adapter, |txn| handler.create_or_update_table(txn, &table));

        let loaded = in_txn(&adapter, |txn| handler.get_table(txn, COLL, "db", "t1"));
        assert_eq!(loaded.schema.num_columns(), 3);
        assert_eq!(loaded.schema_version(), 2);
        assert_eq!(loaded.next_column_id, 4);
        assert!(adapter.get_schema(COLL, "t1", Some(2)).wait().is_ok());
    }

    #[test]
    fn test_list_tables_skips_indexes_and_sys_tables() {
        let (handler, adapter, _store) = setup();
        let mut users = user_tags("t1", "user_tags");
        users.add_index(name_index("t1")).unwrap();
        let mut sys = user_tags("t2", "pg_thing");
        sys.is_sys_table = true;
        in_txn(&adapter, |txn| {
            handler.create_or_update_table(txn, &users)?;
            handler.create_or_update_table(txn, &sys)
        });

        let user_only = in_txn(&adapter, |txn| handler.list_tables(txn, COLL, "db", false));
        assert_eq!(user_only.len(), 1);
        assert_eq!(user_only[0].table_id, "t1");
        assert_eq!(user_only[0].indexes.len(), 1);

        let all = in_txn(&adapter, |txn| handler.list_tables(txn, COLL, "db", true));
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn test_update_index_permissions() {
        let (handler, adapter, _store) = setup();
        let mut table = user_tags("t1", "user_tags");
        table.add_index(name_index("t1")).unwrap();
        in_txn(&adapter, |txn| handler.create_or_update_table(txn, &table));

        let updated = in_txn(&adapter, |txn| {
            handler.update_index_permissions(txn, &table, "t1_idx", IndexPermissions::WriteAndDelete)
        });
        assert_eq!(updated.index_permissions, IndexPermissions::WriteAndDelete);

        let loaded = in_txn(&adapter, |txn| handler.get_table(txn, COLL, "db", "t1"));
        assert_eq!(loaded.index("t1_idx").unwrap().index_permissions, IndexPermissions::WriteAndDelete);

        let txn = adapter.begin_transaction(Duration::from_secs(5)).wait().unwrap();
        let backwards =
            handler.update_index_permissions(txn, &loaded, "t1_idx", IndexPermissions::DeleteOnly);
        assert!(matches!(backwards, Err(GateError::InvalidArgument { .. })));
    }

    #[test]
    fn test_delete_table_and_index() {
        let (handler, adapter, _store) = setup();
        let mut table = user_tags("t1", "user_tags");
        table.add_index(name_index("t1")).unwrap();
        let other = user_tags("t2", "other");
        in_txn(&adapter, |txn| {
            handler.create_or_update_table(txn, &table)?;
            handler.create_or_update_table(txn, &other)
        });

        in_txn(&adapter, |txn| handler.delete_index(txn, COLL, "t1_idx"));
        let loaded = in_txn(&adapter, |txn| handler.get_table(txn, COLL, "db", "t1"));
        assert!(loaded.indexes.is_empty());

        in_txn(&adapter, |txn| handler.delete_table(txn, &table));
        assert!(!in_txn(&adapter, |txn| handler.check_table_exists(txn, COLL, "t1")));
        // a neighbouring table keeps its columns
        let other_loaded = in_txn(&adapter, |txn| handler.get_table(txn, COLL, "db", "t2"));
        assert_eq!(other_loaded, other);
    }

    #[test]
    fn test_catalog_scans_follow_every_page() {
        let config = GateConfig { default_page_limit: 2, ..GateConfig::for_testing() };
        let (handler, adapter, _store) = setup_with(config);
        let tables: Vec<_> =
            (1..=5).map(|i| wide_table(&format!("w{i}"), &format!("wide_{i}"), 7)).collect();
        in_txn(&adapter, |txn| tables.iter().try_for_each(|t| handler.create_or_update_table(txn, t)));

        let loaded = in_txn(&adapter, |txn| handler.get_table(txn, COLL, "db", "w3"));
        assert_eq!(loaded.schema.num_columns(), 7);
        assert_eq!(loaded, tables[2]);

        let listed = in_txn(&adapter, |txn| handler.list_tables(txn, COLL, "db", false));
        assert_eq!(listed.len(), 5);
        assert!(listed.iter().all(|t| t.schema.num_columns() == 7));
    }

    #[test]
    fn test_table_ids_sharing_a_prefix_stay_apart() {
        let config = GateConfig { default_page_limit: 2, ..GateConfig::for_testing() };
        let (handler, adapter, _store) = setup_with(config);
        let mut short = wide_table("t1", "short", 3);
        let long = wide_table("t10", "long", 6);
        in_txn(&adapter, |txn| {
            handler.create_or_update_table(txn, &short)?;
            handler.create_or_update_table(txn, &long)
        });

        let loaded = in_txn(&adapter, |txn| handler.get_table(txn, COLL, "db", "t1"));
        assert_eq!(loaded.schema.num_columns(), 3);

        // rewriting t1 prunes only its own stale columns
        short.drop_column("c2").unwrap();
        in_txn(&adapter, |txn| handler.create_or_update_table(txn, &short));
        let long_loaded = in_txn(&adapter, |txn| handler.get_table(txn, COLL, "db", "t10"));
        assert_eq!(long_loaded, long);

        in_txn(&adapter, |txn| handler.delete_table(txn, &short));
        let long_loaded = in_txn(&adapter, |txn| handler.get_table(txn, COLL, "db", "t10"));
        assert_eq!(long_loaded, long);
        assert!(!in_txn(&adapter, |txn| handler.check_table_exists(txn, COLL, "t1")));
    }
}
