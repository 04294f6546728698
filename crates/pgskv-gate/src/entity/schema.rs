//! Relational table schema.

use std::collections::HashSet;

use pgskv_common::{GateError, GateResult, FIRST_COLUMN_ID};

use super::{DataType, SortingType};

/// One relational column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    /// Column name.
    pub name: String,
    /// Relational type.
    pub data_type: DataType,
    /// Whether the column accepts nulls.
    pub is_nullable: bool,
    /// Part of the primary key.
    pub is_primary: bool,
    /// Part of the hash (partition) portion of the primary key.
    pub is_partition: bool,
    /// Relational attribute number.
    pub order: i32,
    /// Sort order when part of the key.
    pub sorting_type: SortingType,
}

impl ColumnSchema {
    /// Creates a nullable, non-key column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            is_nullable: true,
            is_primary: false,
            is_partition: false,
            order: 0,
            sorting_type: SortingType::NotSpecified,
        }
    }

    /// Marks the column as a range key column.
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self.is_nullable = false;
        self
    }

    /// Marks the column as a hash key column.
    #[must_use]
    pub fn partition(mut self) -> Self {
        self.is_partition = true;
        self.primary()
    }

    /// Marks the column as not nullable.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.is_nullable = false;
        self
    }

    /// Sets the attribute number.
    #[must_use]
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Sets the sort order.
    #[must_use]
    pub fn with_sorting(mut self, sorting_type: SortingType) -> Self {
        self.sorting_type = sorting_type;
        self
    }
}

/// Ordered columns of a table plus their stable column ids.
///
/// Key columns always come first. Column ids survive column drops, so after
/// an `ALTER TABLE ... DROP COLUMN` the id of a column and its position are
/// no longer the same number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    columns: Vec<ColumnSchema>,
    column_ids: Vec<i32>,
    version: u32,
}

impl TableSchema {
    /// Creates a schema from columns and their ids.
    pub fn new(columns: Vec<ColumnSchema>, column_ids: Vec<i32>, version: u32) -> GateResult<Self> {
        if columns.len() != column_ids.len() {
            return Err(GateError::invalid_argument(format!(
                "{} columns but {} column ids",
                columns.len(),
                column_ids.len()
            )));
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for (column, id) in columns.iter().zip(&column_ids) {
            if !names.insert(column.name.as_str()) {
                return Err(GateError::invalid_argument(format!(
                    "duplicate column name {}",
                    column.name
                )));
            }
            if !ids.insert(*id) {
                return Err(GateError::invalid_argument(format!("duplicate column id {id}")));
            }
        }

        let num_keys = columns.iter().filter(|c| c.is_primary).count();
        if columns.iter().take(num_keys).any(|c| !c.is_primary) {
            return Err(GateError::invalid_argument("key columns must precede value columns"));
        }

        Ok(Self { columns, column_ids, version })
    }

    /// Creates a schema assigning ids from `FIRST_COLUMN_ID` in column order.
    pub fn with_sequential_ids(columns: Vec<ColumnSchema>, version: u32) -> GateResult<Self> {
        let ids = (FIRST_COLUMN_ID..).take(columns.len()).collect();
        Self::new(columns, ids, version)
    }

    /// Columns in order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Column ids, parallel to `columns()`.
    #[must_use]
    pub fn column_ids(&self) -> &[i32] {
        &self.column_ids
    }

    /// Column at `idx`.
    #[must_use]
    pub fn column(&self, idx: usize) -> Option<&ColumnSchema> {
        self.columns.get(idx)
    }

    /// Number of columns.
    #[inline]
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Number of leading key columns.
    #[must_use]
    pub fn num_key_columns(&self) -> usize {
        self.columns.iter().filter(|c| c.is_primary).count()
    }

    /// Number of hash key columns.
    #[must_use]
    pub fn num_hash_key_columns(&self) -> usize {
        self.columns.iter().filter(|c| c.is_partition).count()
    }

    /// Position of the column named `name`.
    #[must_use]
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Position of the column with id `id`.
    #[must_use]
    pub fn find_column_by_id(&self, id: i32) -> Option<usize> {
        self.column_ids.iter().position(|c| *c == id)
    }

    /// Column with id `id`.
    #[must_use]
    pub fn column_by_id(&self, id: i32) -> Option<&ColumnSchema> {
        self.find_column_by_id(id).map(|idx| &self.columns[idx])
    }

    /// Largest column id in use.
    #[must_use]
    pub fn max_column_id(&self) -> Option<i32> {
        self.column_ids.iter().copied().max()
    }

    /// Schema version.
    #[inline]
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Appends a value column under `id` and bumps the version.
    pub fn add_column(&mut self, column: ColumnSchema, id: i32) -> GateResult<()> {
        if column.is_primary {
            return Err(GateError::not_supported("adding a key column"));
        }
        if self.find_column(&column.name).is_some() {
            return Err(GateError::invalid_argument(format!(
                "column {} already exists",
                column.name
            )));
        }
        if self.find_column_by_id(id).is_some() {
            return Err(GateError::invalid_argument(format!("duplicate column id {id}")));
        }
        self.columns.push(column);
        self.column_ids.push(id);
        self.version += 1;
        Ok(())
    }

    /// Removes a value column and bumps the version.
    pub fn drop_column(&mut self, name: &str) -> GateResult<ColumnSchema> {
        let idx = self
            .find_column(name)
            .ok_or_else(|| GateError::not_found(format!("column {name} does not exist")))?;
        if self.columns[idx].is_primary {
            return Err(GateError::not_supported("dropping a key column"));
        }
        self.column_ids.remove(idx);
        self.version += 1;
        Ok(self.columns.remove(idx))
    }
}
