//! Session-facing table descriptors.
//!
//! The relational engine addresses columns by attribute number. A
//! descriptor resolves those numbers to key-value field positions, which is
//! what operation requests carry.

use std::collections::HashMap;

use pgskv_common::{GateError, GateResult, PgOid, SKV_FIELD_OFFSET};

use super::{DataType, IndexInfo, SortingType, TableInfo};

/// One column of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDesc {
    /// Relational attribute number.
    pub attr_num: i32,
    /// Stable column id.
    pub column_id: i32,
    /// Column name, equal to the key-value field name.
    pub name: String,
    /// Relational type.
    pub data_type: DataType,
    /// Position of the field in the key-value schema.
    pub field_index: usize,
    /// Part of the key.
    pub is_primary: bool,
    /// Part of the hash portion of the key.
    pub is_partition: bool,
    /// Sort order.
    pub sorting_type: SortingType,
}

/// Descriptor of a table or index as seen by one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDesc {
    collection: String,
    table_id: String,
    table_name: String,
    pg_oid: PgOid,
    schema_version: u32,
    columns: Vec<ColumnDesc>,
    attr_index: HashMap<i32, usize>,
    base_table_id: Option<String>,
    is_unique: bool,
}

impl TableDesc {
    /// Describes a table.
    #[must_use]
    pub fn from_table(table: &TableInfo) -> Self {
        let columns = table
            .schema
            .columns()
            .iter()
            .zip(table.schema.column_ids())
            .enumerate()
            .map(|(idx, (column, id))| ColumnDesc {
                attr_num: column.order,
                column_id: *id,
                name: column.name.clone(),
                data_type: column.data_type,
                field_index: idx + SKV_FIELD_OFFSET,
                is_primary: column.is_primary,
                is_partition: column.is_partition,
                sorting_type: column.sorting_type,
            })
            .collect();
        Self::build(
            table.namespace_id.clone(),
            table.table_id.clone(),
            table.table_name.clone(),
            table.table_oid,
            table.schema_version(),
            columns,
            None,
            false,
        )
    }

    /// Describes an index stored in `collection`.
    #[must_use]
    pub fn from_index(index: &IndexInfo, collection: impl Into<String>) -> Self {
        let columns = index
            .columns
            .iter()
            .enumerate()
            .map(|(idx, column)| ColumnDesc {
                attr_num: column.order,
                column_id: column.column_id,
                name: column.column_name.clone(),
                data_type: column.data_type,
                field_index: idx + SKV_FIELD_OFFSET,
                is_primary: true,
                is_partition: column.is_partition,
                sorting_type: column.sorting_type,
            })
            .collect();
        Self::build(
            collection.into(),
            index.table_id.clone(),
            index.table_name.clone(),
            index.pg_oid,
            index.version,
            columns,
            Some(index.base_table_id.clone()),
            index.is_unique,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        collection: String,
        table_id: String,
        table_name: String,
        pg_oid: PgOid,
        schema_version: u32,
        columns: Vec<ColumnDesc>,
        base_table_id: Option<String>,
        is_unique: bool,
    ) -> Self {
        let attr_index = columns.iter().enumerate().map(|(i, c)| (c.attr_num, i)).collect();
        Self {
            collection,
            table_id,
            table_name,
            pg_oid,
            schema_version,
            columns,
            attr_index,
            base_table_id,
            is_unique,
        }
    }

    /// Collection holding the rows.
    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Table id, also the key-value schema name.
    #[must_use]
    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    /// Table name.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Relational object id.
    #[must_use]
    pub fn pg_oid(&self) -> PgOid {
        self.pg_oid
    }

    /// Key-value schema version rows are written with.
    #[must_use]
    pub fn schema_version(&self) -> u32 {
        self.schema_version
    }

    /// Columns in field order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnDesc] {
        &self.columns
    }

    /// Column at field position `field_index`.
    #[must_use]
    pub fn column(&self, field_index: usize) -> Option<&ColumnDesc> {
        field_index
            .checked_sub(SKV_FIELD_OFFSET)
            .and_then(|idx| self.columns.get(idx))
    }

    /// Resolves an attribute number.
    pub fn find_column(&self, attr_num: i32) -> GateResult<&ColumnDesc> {
        self.attr_index
            .get(&attr_num)
            .map(|idx| &self.columns[*idx])
            .ok_or_else(|| {
                GateError::invalid_argument(format!(
                    "invalid column number {attr_num} for table {}",
                    self.table_id
                ))
            })
    }

    /// Resolves a column name.
    #[must_use]
    pub fn find_column_by_name(&self, name: &str) -> Option<&ColumnDesc> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Number of key columns.
    #[must_use]
    pub fn num_key_columns(&self) -> usize {
        self.columns.iter().filter(|c| c.is_primary).count()
    }

    /// Number of hash key columns.
    #[must_use]
    pub fn num_hash_key_columns(&self) -> usize {
        self.columns.iter().filter(|c| c.is_partition).count()
    }

    /// Key columns in key order.
    pub fn key_columns(&self) -> impl Iterator<Item = &ColumnDesc> {
        self.columns.iter().filter(|c| c.is_primary)
    }

    /// Returns true if this describes an index.
    #[must_use]
    pub fn is_index(&self) -> bool {
        self.base_table_id.is_some()
    }

    /// Indexed table when this describes an index.
    #[must_use]
    pub fn base_table_id(&self) -> Option<&str> {
        self.base_table_id.as_deref()
    }

    /// Unique index.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.is_unique
    }

    /// Rows of every table here are written transactionally.
    #[must_use]
    pub fn is_transactional(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ColumnSchema, IndexColumn, TableSchema};

    fn table() -> TableInfo {
        let mut schema = TableSchema::with_sequential_ids(
            vec![
                ColumnSchema::new("id", DataType::Int32).partition().with_order(1),
                ColumnSchema::new("a", DataType::String).with_order(2),
                ColumnSchema::new("b", DataType::Bool).with_order(3),
            ],
            1,
        )
        .unwrap();
        schema.drop_column("a").unwrap();
        TableInfo::new("ns", "db", "t", "things", 16384, schema)
    }

    #[test]
    fn test_attr_numbers_resolve_to_field_positions() {
        let desc = TableDesc::from_table(&table());
        let b = desc.find_column(3).unwrap();
        assert_eq!(b.column_id, 2);
        assert_eq!(b.field_index, 1);
        assert_eq!(desc.column(1).unwrap().name, "b");
        assert_eq!(desc.schema_version(), 2);
        assert!(matches!(desc.find_column(2), Err(GateError::InvalidArgument { .. })));
        assert_eq!(desc.num_key_columns(), 1);
        assert!(!desc.is_index());
    }

    #[test]
    fn test_index_desc() {
        let index = IndexInfo::new(
            "i",
            "things_b_idx",
            16390,
            "t",
            true,
            vec![IndexColumn {
                column_id: 0,
                column_name: "b".into(),
                data_type: DataType::Bool,
                is_nullable: true,
                is_partition: true,
                order: 1,
                sorting_type: SortingType::NotSpecified,
                base_column_id: 2,
            }],
        );
        let desc = TableDesc::from_index(&index, "ns");
        assert!(desc.is_index());
        assert!(desc.is_unique());
        assert_eq!(desc.base_table_id(), Some("t"));
        assert_eq!(desc.num_key_columns(), 1);
        assert_eq!(desc.collection(), "ns");
    }
}
