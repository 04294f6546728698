//! Relational schema to key-value schema mapping.
//!
//! ```text
//!  TableInfo ──derive_table_schema──▶ Schema { name: table_id, fields, pk: key columns }
//!  IndexInfo ──derive_index_schema──▶ Schema { name: index_id, fields, pk: every field }
//! ```
//!
//! Field order always equals column order, so a column's position in the
//! relational schema is its field position in the key-value schema.

use pgskv_common::{GateError, GateResult, SKV_FIELD_OFFSET};
use pgskv_store::{FieldType, Schema, SchemaField};

use crate::entity::{DataType, IndexInfo, SortingType, TableInfo, TableSchema};

/// Key-value field type storing a relational type.
pub fn to_field_type(data_type: DataType) -> GateResult<FieldType> {
    match data_type {
        DataType::Int8 | DataType::Int16 => Ok(FieldType::Int16),
        DataType::Int32 => Ok(FieldType::Int32),
        DataType::Int64 | DataType::Timestamp => Ok(FieldType::Int64),
        DataType::String | DataType::Binary => Ok(FieldType::String),
        DataType::Bool => Ok(FieldType::Bool),
        DataType::Float => Ok(FieldType::Float),
        DataType::Double => Ok(FieldType::Double),
        DataType::Decimal => Ok(FieldType::Decimal64),
        DataType::Date | DataType::Time | DataType::Uuid | DataType::Json => {
            Err(GateError::UnsupportedType { type_name: data_type.name().to_string() })
        }
    }
}

/// `(descending, null_last)` flags for a sort order.
#[must_use]
pub fn sort_flags(sorting_type: SortingType) -> (bool, bool) {
    match sorting_type {
        SortingType::NotSpecified | SortingType::Ascending => (false, false),
        SortingType::Descending => (true, false),
        SortingType::AscendingNullsLast => (false, true),
        SortingType::DescendingNullsLast => (true, true),
    }
}

/// Derives the key-value schema of a table.
pub fn derive_table_schema(table: &TableInfo) -> GateResult<Schema> {
    let mut schema = Schema::new(table.table_id.clone(), table.schema_version());
    for (idx, column) in table.schema.columns().iter().enumerate() {
        let (descending, null_last) = sort_flags(column.sorting_type);
        schema.fields.push(
            SchemaField::new(column.name.clone(), to_field_type(column.data_type)?)
                .with_sort(descending, null_last),
        );
        if column.is_primary {
            schema.partition_key_fields.push(idx + SKV_FIELD_OFFSET);
        }
    }
    Ok(schema)
}

/// Derives the key-value schema of an index over `base`.
///
/// Every index column is part of the partition key so that each index row
/// has its own identity. Field types and sort orders come from the base
/// columns.
pub fn derive_index_schema(index: &IndexInfo, base: &TableSchema) -> GateResult<Schema> {
    let mut schema = Schema::new(index.table_id.clone(), index.version);
    for (idx, column) in index.columns.iter().enumerate() {
        let base_column = base.column_by_id(column.base_column_id).ok_or_else(|| {
            GateError::invalid_argument(format!(
                "cannot find base column {} for index {}",
                column.base_column_id, index.table_id
            ))
        })?;
        let (descending, null_last) = sort_flags(base_column.sorting_type);
        schema.fields.push(
            SchemaField::new(column.column_name.clone(), to_field_type(base_column.data_type)?)
                .with_sort(descending, null_last),
        );
        schema.partition_key_fields.push(idx + SKV_FIELD_OFFSET);
    }
    Ok(schema)
}

/// Derives the schemas of every index of `table`.
pub fn derive_index_schemas(table: &TableInfo) -> GateResult<Vec<Schema>> {
    table
        .indexes
        .values()
        .map(|index| derive_index_schema(index, &table.schema))
        .collect()
}
