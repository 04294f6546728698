//! Catalog record codec.
//!
//! Encodes tables and indexes as records of the sys schemas and rebuilds
//! them from scanned records. Every record is written and read strictly in
//! field order; fields that do not apply are skipped, never omitted.

use std::sync::Arc;

use pgskv_common::{GateError, GateResult, PgOid};
use pgskv_store::{FromFieldValue, Schema, SkvRecord};

use crate::entity::{
    ColumnSchema, DataType, IndexColumn, IndexInfo, IndexPermissions, SortingType, TableInfo,
    TableSchema,
};

// =============================================================================
// Table Head
// =============================================================================

/// Decoded table-head record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHead {
    /// Table or index id.
    pub table_id: String,
    /// Table or index name.
    pub table_name: String,
    /// Relational object id.
    pub table_oid: PgOid,
    /// Part of the relational system catalog.
    pub is_sys_table: bool,
    /// Rows are written transactionally.
    pub is_transactional: bool,
    /// The head describes an index.
    pub is_index: bool,
    /// Unique index; false for tables.
    pub is_unique: bool,
    /// Base table of an index.
    pub indexed_table_id: Option<String>,
    /// Build state of an index.
    pub index_permissions: Option<IndexPermissions>,
    /// Id the next added column receives.
    pub next_column_id: i32,
    /// Schema version.
    pub schema_version: u32,
}

fn version_field(version: u32) -> GateResult<i32> {
    i32::try_from(version)
        .map_err(|_| GateError::invalid_argument(format!("schema version {version} out of range")))
}

fn oid_field(oid: PgOid) -> i64 {
    i64::from(oid)
}

/// A head record with only the key set, for point reads and erases.
pub fn head_key_record(
    collection: &str,
    head_schema: Arc<Schema>,
    table_id: &str,
) -> GateResult<SkvRecord> {
    let mut record = SkvRecord::new(collection, head_schema);
    record.serialize_next(table_id)?;
    Ok(record)
}

/// Encodes the head record of a table.
pub fn table_head_record(
    collection: &str,
    head_schema: Arc<Schema>,
    table: &TableInfo,
) -> GateResult<SkvRecord> {
    let mut record = SkvRecord::new(collection, head_schema);
    record.serialize_next(table.table_id.as_str())?;
    record.serialize_next(table.table_name.as_str())?;
    record.serialize_next(oid_field(table.table_oid))?;
    record.serialize_next(table.is_sys_table)?;
    record.serialize_next(table.is_transactional)?;
    record.serialize_next(false)?;
    // IsUnique, IndexedTableId, IndexPermission
    record.skip_next()?;
    record.skip_next()?;
    record.skip_next()?;
    record.serialize_next(table.next_column_id)?;
    record.serialize_next(version_field(table.schema_version())?)?;
    Ok(record)
}

/// Encodes the head record of an index.
///
/// `is_sys_table` and `next_column_id` are taken from the caller because an
/// index inherits them from its base table.
pub fn index_head_record(
    collection: &str,
    head_schema: Arc<Schema>,
    index: &IndexInfo,
    is_sys_table: bool,
    next_column_id: i32,
) -> GateResult<SkvRecord> {
    let mut record = SkvRecord::new(collection, head_schema);
    record.serialize_next(index.table_id.as_str())?;
    record.serialize_next(index.table_name.as_str())?;
    record.serialize_next(oid_field(index.pg_oid))?;
    record.serialize_next(is_sys_table)?;
    record.serialize_next(true)?;
    record.serialize_next(true)?;
    record.serialize_next(index.is_unique)?;
    record.serialize_next(index.base_table_id.as_str())?;
    record.serialize_next(index.index_permissions.id())?;
    record.serialize_next(next_column_id)?;
    record.serialize_next(version_field(index.version)?)?;
    Ok(record)
}

fn next_required<T: FromFieldValue>(record: &mut SkvRecord, name: &str) -> GateResult<T> {
    record.deserialize_next::<T>()?.ok_or_else(|| {
        GateError::corruption(format!("{} record lacks {name}", record.schema().name))
    })
}

/// Decodes a head record.
pub fn decode_table_head(mut record: SkvRecord) -> GateResult<TableHead> {
    record.reset_cursor();
    let table_id: String = next_required(&mut record, "TableId")?;
    let table_name: String = next_required(&mut record, "TableName")?;
    let table_oid: i64 = next_required(&mut record, "TableOid")?;
    let table_oid = PgOid::try_from(table_oid)
        .map_err(|_| GateError::corruption(format!("table {table_id} has bad oid {table_oid}")))?;
    let is_sys_table: bool = next_required(&mut record, "IsSysTable")?;
    let is_transactional: bool = next_required(&mut record, "IsTransactional")?;
    let is_index: bool = next_required(&mut record, "IsIndex")?;
    let is_unique = record.deserialize_next::<bool>()?.unwrap_or(false);
    let indexed_table_id = record.deserialize_next::<String>()?;
    let index_permissions =
        record.deserialize_next::<i16>()?.map(IndexPermissions::from_id).transpose()?;
    let next_column_id: i32 = next_required(&mut record, "NextColumnId")?;
    let schema_version: i32 = next_required(&mut record, "SchemaVersion")?;
    let schema_version = u32::try_from(schema_version).map_err(|_| {
        GateError::corruption(format!("table {table_id} has bad schema version {schema_version}"))
    })?;

    Ok(TableHead {
        table_id,
        table_name,
        table_oid,
        is_sys_table,
        is_transactional,
        is_index,
        is_unique,
        indexed_table_id,
        index_permissions,
        next_column_id,
        schema_version,
    })
}

// =============================================================================
// Columns
// =============================================================================

fn serialize_column_fields(
    record: &mut SkvRecord,
    table_id: &str,
    column_id: i32,
    column: &ColumnSchema,
) -> GateResult<()> {
    record.serialize_next(table_id)?;
    record.serialize_next(column_id)?;
    record.serialize_next(column.name.as_str())?;
    record.serialize_next(column.data_type.id())?;
    record.serialize_next(column.is_nullable)?;
    record.serialize_next(column.is_primary)?;
    record.serialize_next(column.is_partition)?;
    record.serialize_next(column.order)?;
    record.serialize_next(column.sorting_type.id())?;
    Ok(())
}

/// Encodes one record per column of `table`.
pub fn table_column_records(
    collection: &str,
    column_schema: &Arc<Schema>,
    table: &TableInfo,
) -> GateResult<Vec<SkvRecord>> {
    table
        .schema
        .columns()
        .iter()
        .zip(table.schema.column_ids())
        .map(|(column, id)| {
            let mut record = SkvRecord::new(collection, Arc::clone(column_schema));
            serialize_column_fields(&mut record, &table.table_id, *id, column)?;
            Ok(record)
        })
        .collect()
}

/// Encodes one record per column of `index` over `base`.
///
/// Every index column is a key column and takes its type and sort order
/// from the base column.
pub fn index_column_records(
    collection: &str,
    index_column_schema: &Arc<Schema>,
    index: &IndexInfo,
    base: &TableSchema,
) -> GateResult<Vec<SkvRecord>> {
    index
        .columns
        .iter()
        .map(|column| {
            let base_column = base.column_by_id(column.base_column_id).ok_or_else(|| {
                GateError::invalid_argument(format!(
                    "cannot find base column {} for index {}",
                    column.base_column_id, index.table_id
                ))
            })?;
            let as_column = ColumnSchema {
                name: column.column_name.clone(),
                data_type: base_column.data_type,
                is_nullable: column.is_nullable,
                is_primary: true,
                is_partition: column.is_partition,
                order: column.order,
                sorting_type: base_column.sorting_type,
            };
            let mut record = SkvRecord::new(collection, Arc::clone(index_column_schema));
            serialize_column_fields(&mut record, &index.table_id, column.column_id, &as_column)?;
            record.serialize_next(column.base_column_id)?;
            Ok(record)
        })
        .collect()
}

struct DecodedColumn {
    table_id: String,
    column_id: i32,
    column: ColumnSchema,
}

fn decode_column_fields(record: &mut SkvRecord) -> GateResult<DecodedColumn> {
    record.reset_cursor();
    let table_id: String = next_required(record, "TableId")?;
    let column_id: i32 = next_required(record, "ColumnId")?;
    let name: String = next_required(record, "ColumnName")?;
    let data_type = DataType::from_id(next_required(record, "ColumnType")?)?;
    let mut column = ColumnSchema::new(name, data_type);
    column.is_nullable = next_required(record, "IsNullable")?;
    column.is_primary = next_required(record, "IsPrimary")?;
    column.is_partition = next_required(record, "IsPartition")?;
    column.order = next_required(record, "Order")?;
    column.sorting_type = SortingType::from_id(next_required(record, "SortingType")?)?;
    Ok(DecodedColumn { table_id, column_id, column })
}

fn check_owner(decoded: &DecodedColumn, table_id: &str) -> GateResult<()> {
    if decoded.table_id != table_id {
        return Err(GateError::corruption(format!(
            "column {} of {} returned for {table_id}",
            decoded.column_id, decoded.table_id
        )));
    }
    Ok(())
}

// =============================================================================
// Reconstruction
// =============================================================================

/// Rebuilds a table from its head and column records.
///
/// Columns are ordered by column id. Indexes are not included.
pub fn build_table_info(
    namespace_id: &str,
    namespace_name: &str,
    head: &TableHead,
    column_records: Vec<SkvRecord>,
) -> GateResult<TableInfo> {
    if head.is_index {
        return Err(GateError::corruption(format!(
            "head of {} describes an index, expected a table",
            head.table_id
        )));
    }
    let mut decoded = column_records
        .into_iter()
        .map(|mut record| decode_column_fields(&mut record))
        .collect::<GateResult<Vec<_>>>()?;
    decoded.sort_by_key(|d| d.column_id);

    let mut columns = Vec::with_capacity(decoded.len());
    let mut ids = Vec::with_capacity(decoded.len());
    for d in decoded {
        check_owner(&d, &head.table_id)?;
        ids.push(d.column_id);
        columns.push(d.column);
    }
    let schema = TableSchema::new(columns, ids, head.schema_version)
        .map_err(|e| GateError::corruption(format!("table {}: {e}", head.table_id)))?;

    let mut table = TableInfo::new(
        namespace_id,
        namespace_name,
        head.table_id.clone(),
        head.table_name.clone(),
        head.table_oid,
        schema,
    );
    table.next_column_id = head.next_column_id;
    table.is_sys_table = head.is_sys_table;
    table.is_transactional = head.is_transactional;
    Ok(table)
}

/// Rebuilds an index from its head and index-column records.
pub fn build_index_info(head: &TableHead, column_records: Vec<SkvRecord>) -> GateResult<IndexInfo> {
    if !head.is_index {
        return Err(GateError::corruption(format!(
            "head of {} describes a table, expected an index",
            head.table_id
        )));
    }
    let base_table_id = head.indexed_table_id.clone().ok_or_else(|| {
        GateError::corruption(format!("index {} has no indexed table id", head.table_id))
    })?;
    let permissions = head.index_permissions.ok_or_else(|| {
        GateError::corruption(format!("index {} has no permission state", head.table_id))
    })?;

    let mut columns = column_records
        .into_iter()
        .map(|mut record| {
            let d = decode_column_fields(&mut record)?;
            check_owner(&d, &head.table_id)?;
            let base_column_id: i32 = next_required(&mut record, "IndexedColumnId")?;
            Ok(IndexColumn {
                column_id: d.column_id,
                column_name: d.column.name,
                data_type: d.column.data_type,
                is_nullable: d.column.is_nullable,
                is_partition: d.column.is_partition,
                order: d.column.order,
                sorting_type: d.column.sorting_type,
                base_column_id,
            })
        })
        .collect::<GateResult<Vec<_>>>()?;
    columns.sort_by_key(|c| c.column_id);

    let mut index = IndexInfo::new(
        head.table_id.clone(),
        head.table_name.clone(),
        head.table_oid,
        base_table_id,
        head.is_unique,
        columns,
    )
    .with_permissions(permissions);
    index.version = head.schema_version;
    Ok(index)
}
