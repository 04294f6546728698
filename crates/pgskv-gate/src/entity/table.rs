//! Table metadata.

use std::collections::BTreeMap;

use pgskv_common::{GateError, GateResult, PgOid, FIRST_COLUMN_ID};

use super::{ColumnSchema, IndexInfo, TableSchema};

/// Catalog view of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    /// Namespace (database) id; also the collection name.
    pub namespace_id: String,
    /// Database name.
    pub namespace_name: String,
    /// Table id (also the name of its key-value schema).
    pub table_id: String,
    /// Table name.
    pub table_name: String,
    /// Relational object id.
    pub table_oid: PgOid,
    /// Columns and schema version.
    pub schema: TableSchema,
    /// Id the next added column receives.
    pub next_column_id: i32,
    /// Part of the relational system catalog.
    pub is_sys_table: bool,
    /// Rows are written transactionally.
    pub is_transactional: bool,
    /// Secondary indexes keyed by index table id.
    pub indexes: BTreeMap<String, IndexInfo>,
}

impl TableInfo {
    /// Creates a transactional user table.
    pub fn new(
        namespace_id: impl Into<String>,
        namespace_name: impl Into<String>,
        table_id: impl Into<String>,
        table_name: impl Into<String>,
        table_oid: PgOid,
        schema: TableSchema,
    ) -> Self {
        let next_column_id = schema.max_column_id().map_or(FIRST_COLUMN_ID, |id| id + 1);
        Self {
            namespace_id: namespace_id.into(),
            namespace_name: namespace_name.into(),
            table_id: table_id.into(),
            table_name: table_name.into(),
            table_oid,
            schema,
            next_column_id,
            is_sys_table: false,
            is_transactional: true,
            indexes: BTreeMap::new(),
        }
    }

    /// Schema version.
    #[inline]
    #[must_use]
    pub fn schema_version(&self) -> u32 {
        self.schema.version()
    }

    /// Returns true if the table has secondary indexes.
    #[must_use]
    pub fn has_secondary_indexes(&self) -> bool {
        !self.indexes.is_empty()
    }

    /// Index with id `index_id`.
    #[must_use]
    pub fn index(&self, index_id: &str) -> Option<&IndexInfo> {
        self.indexes.get(index_id)
    }

    /// Registers an index.
    pub fn add_index(&mut self, index: IndexInfo) -> GateResult<()> {
        if index.base_table_id != self.table_id {
            return Err(GateError::invalid_argument(format!(
                "index {} belongs to {}, not {}",
                index.table_id, index.base_table_id, self.table_id
            )));
        }
        for column in &index.columns {
            if self.schema.column_by_id(column.base_column_id).is_none() {
                return Err(GateError::invalid_argument(format!(
                    "cannot find base column {} for index {}",
                    column.base_column_id, index.table_id
                )));
            }
        }
        self.indexes.insert(index.table_id.clone(), index);
        Ok(())
    }

    /// Adds a value column with the next column id.
    pub fn add_column(&mut self, column: ColumnSchema) -> GateResult<i32> {
        let id = self.next_column_id;
        self.schema.add_column(column, id)?;
        self.next_column_id += 1;
        Ok(id)
    }

    /// Drops a value column not referenced by any index.
    pub fn drop_column(&mut self, name: &str) -> GateResult<()> {
        if let Some(idx) = self.schema.find_column(name) {
            let id = self.schema.column_ids()[idx];
            let indexed = self
                .indexes
                .values()
                .any(|index| index.columns.iter().any(|c| c.base_column_id == id));
            if indexed {
                return Err(GateError::not_supported(format!("dropping indexed column {name}")));
            }
        }
        self.schema.drop_column(name).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{DataType, IndexColumn, SortingType};

    fn table() -> TableInfo {
        let schema = TableSchema::with_sequential_ids(
            vec![
                ColumnSchema::new("id", DataType::Int64).partition(),
                ColumnSchema::new("name", DataType::String),
            ],
            1,
        )
        .unwrap();
        TableInfo::new("ns", "db", "t1", "users", 16385, schema)
    }

    fn name_index(base_column_id: i32) -> IndexInfo {
        IndexInfo::new(
            "i1",
            "users_name_idx",
            16390,
            "t1",
            false,
            vec![IndexColumn {
                column_id: 0,
                column_name: "name".into(),
                data_type: DataType::String,
                is_nullable: true,
                is_partition: false,
                order: 1,
                sorting_type: SortingType::Ascending,
                base_column_id,
            }],
        )
    }

    #[test]
    fn test_next_column_id() {
        let mut table = table();
        assert_eq!(table.next_column_id, 2);
        assert_eq!(table.add_column(ColumnSchema::new("age", DataType::Int32)).unwrap(), 2);
        assert_eq!(table.next_column_id, 3);
        assert_eq!(table.schema_version(), 2);
    }

    #[test]
    fn test_add_index_checks_base_columns() {
        let mut table = table();
        assert!(table.add_index(name_index(7)).is_err());
        table.add_index(name_index(1)).unwrap();
        assert!(table.has_secondary_indexes());
        assert!(table.index("i1").is_some());
    }

    #[test]
    fn test_cannot_drop_indexed_column() {
        let mut table = table();
        table.add_index(name_index(1)).unwrap();
        assert!(matches!(table.drop_column("name"), Err(GateError::NotSupported { .. })));
    }
}
