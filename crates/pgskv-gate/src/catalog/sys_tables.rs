//! Layouts of the sys catalog schemas.
//!
//! Field order is part of the persisted format. Every writer and reader
//! walks these fields in exactly this order with the record cursor.

use pgskv_common::{
    SYS_INDEX_COLUMN_SCHEMA, SYS_SCHEMA_VERSION, SYS_TABLE_COLUMN_SCHEMA, SYS_TABLE_HEAD_SCHEMA,
};
use pgskv_store::{FieldType, Schema, SchemaField};

/// Table id field, the first field of every sys schema.
pub const TABLE_ID: &str = "TableId";
/// Head field holding the id of the table an index belongs to.
pub const INDEXED_TABLE_ID: &str = "IndexedTableId";
/// Head field telling indexes from tables.
pub const IS_INDEX: &str = "IsIndex";

/// One record per table or index.
#[must_use]
pub fn table_head_schema() -> Schema {
    Schema::new(SYS_TABLE_HEAD_SCHEMA, SYS_SCHEMA_VERSION)
        .with_field(SchemaField::new(TABLE_ID, FieldType::String))
        .with_field(SchemaField::new("TableName", FieldType::String))
        .with_field(SchemaField::new("TableOid", FieldType::Int64))
        .with_field(SchemaField::new("IsSysTable", FieldType::Bool))
        .with_field(SchemaField::new("IsTransactional", FieldType::Bool))
        .with_field(SchemaField::new(IS_INDEX, FieldType::Bool))
        .with_field(SchemaField::new("IsUnique", FieldType::Bool))
        .with_field(SchemaField::new(INDEXED_TABLE_ID, FieldType::String))
        .with_field(SchemaField::new("IndexPermission", FieldType::Int16))
        .with_field(SchemaField::new("NextColumnId", FieldType::Int32))
        .with_field(SchemaField::new("SchemaVersion", FieldType::Int32))
        .with_partition_key(vec![0])
}

fn column_fields(name: &str) -> Schema {
    Schema::new(name, SYS_SCHEMA_VERSION)
        .with_field(SchemaField::new(TABLE_ID, FieldType::String))
        .with_field(SchemaField::new("ColumnId", FieldType::Int32))
        .with_field(SchemaField::new("ColumnName", FieldType::String))
        .with_field(SchemaField::new("ColumnType", FieldType::Int16))
        .with_field(SchemaField::new("IsNullable", FieldType::Bool))
        .with_field(SchemaField::new("IsPrimary", FieldType::Bool))
        .with_field(SchemaField::new("IsPartition", FieldType::Bool))
        .with_field(SchemaField::new("Order", FieldType::Int32))
        .with_field(SchemaField::new("SortingType", FieldType::Int16))
        .with_partition_key(vec![0, 1])
}

/// One record per table column.
#[must_use]
pub fn table_column_schema() -> Schema {
    column_fields(SYS_TABLE_COLUMN_SCHEMA)
}

/// One record per index column: the table-column layout plus the indexed
/// base column id.
#[must_use]
pub fn index_column_schema() -> Schema {
    column_fields(SYS_INDEX_COLUMN_SCHEMA)
        .with_field(SchemaField::new("IndexedColumnId", FieldType::Int32))
}

/// All sys schemas in bootstrap order.
#[must_use]
pub fn sys_schemas() -> [Schema; 3] {
    [table_head_schema(), table_column_schema(), index_column_schema()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sys_schemas_are_valid() {
        for schema in sys_schemas() {
            assert!(schema.validate().is_ok(), "{}", schema.name);
            assert_eq!(schema.version, SYS_SCHEMA_VERSION);
            assert_eq!(schema.field_position(TABLE_ID), Some(0));
        }
    }

    #[test]
    fn test_head_layout() {
        let head = table_head_schema();
        assert_eq!(head.len(), 11);
        assert_eq!(head.partition_key_fields, vec![0]);
        assert_eq!(head.field_position(INDEXED_TABLE_ID), Some(7));
        assert_eq!(head.field_position("SchemaVersion"), Some(10));
    }

    #[test]
    fn test_column_layouts() {
        let table = table_column_schema();
        let index = index_column_schema();
        assert_eq!(table.partition_key_fields, vec![0, 1]);
        assert_eq!(index.partition_key_fields, vec![0, 1]);
        assert_eq!(index.len(), table.len() + 1);
        assert_eq!(index.fields[..table.len()], table.fields[..]);
        assert_eq!(index.field_position("IndexedColumnId"), Some(9));
    }
}
