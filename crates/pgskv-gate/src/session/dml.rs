//! Builders turning attribute bindings into adapter operations.
//!
//! The relational engine binds values by attribute number; the builders
//! resolve them through a [`TableDesc`] into field positions.

use std::collections::BTreeMap;

use bytes::Bytes;
use pgskv_common::{GateError, GateResult, SKV_FIELD_OFFSET};

use crate::adapter::{
    ColumnValue, ExprOpcode, PagingState, PgOp, SqlOpExpr, SqlOpReadRequest, SqlOpWriteRequest,
    SqlValue, StmtType,
};
use crate::entity::TableDesc;

fn field_ref(field_index: usize) -> GateResult<i32> {
    i32::try_from(field_index)
        .map_err(|_| GateError::invalid_argument(format!("field position {field_index} out of range")))
}

// =============================================================================
// Writes
// =============================================================================

/// Builds an insert, upsert, update, or delete.
#[derive(Debug)]
pub struct DmlWriteBuilder<'a> {
    desc: &'a TableDesc,
    stmt_type: StmtType,
    row_id: Option<Bytes>,
    keys: BTreeMap<usize, SqlValue>,
    values: BTreeMap<usize, SqlValue>,
}

impl<'a> DmlWriteBuilder<'a> {
    /// Starts a write of kind `stmt_type` against `desc`.
    pub fn new(desc: &'a TableDesc, stmt_type: StmtType) -> GateResult<Self> {
        if matches!(stmt_type, StmtType::Select | StmtType::Truncate) {
            return Err(GateError::usage(format!("{stmt_type:?} is not a row write")));
        }
        Ok(Self { desc, stmt_type, row_id: None, keys: BTreeMap::new(), values: BTreeMap::new() })
    }

    /// Binds a column value.
    ///
    /// Key columns identify the row. Other columns are the written values,
    /// or for an update the new values.
    pub fn bind_column(&mut self, attr_num: i32, value: impl Into<SqlValue>) -> GateResult<&mut Self> {
        let column = self.desc.find_column(attr_num)?;
        let value = value.into();
        if column.is_primary {
            if value.is_null() {
                return Err(GateError::invalid_argument(format!("key column {} is null", column.name)));
            }
            self.keys.insert(column.field_index, value);
        } else {
            self.values.insert(column.field_index, value);
        }
        Ok(self)
    }

    /// Identifies the row by an encoded key instead of key column values.
    pub fn bind_row_id(&mut self, row_id: Bytes) -> &mut Self {
        self.row_id = Some(row_id);
        self
    }

    /// Builds the operation.
    pub fn build(&self) -> GateResult<PgOp> {
        let desc = self.desc;
        let mut request =
            SqlOpWriteRequest::new(desc.collection(), desc.table_id(), desc.schema_version(), self.stmt_type);
        if let Some(row_id) = &self.row_id {
            request.row_id = Some(row_id.clone());
        } else {
            if self.keys.len() != desc.num_key_columns() {
                return Err(GateError::invalid_argument(format!(
                    "write to {} binds {} of {} key columns",
                    desc.table_name(),
                    self.keys.len(),
                    desc.num_key_columns()
                )));
            }
            request.key_column_values = self.keys.values().cloned().map(SqlOpExpr::Value).collect();
        }

        let values = self
            .values
            .iter()
            .map(|(field, value)| ColumnValue::new(*field, SqlOpExpr::Value(value.clone())))
            .collect();
        if self.stmt_type == StmtType::Update {
            request.column_new_values = values;
        } else {
            request.column_values = values;
        }
        Ok(PgOp::write(request))
    }
}

// =============================================================================
// Reads
// =============================================================================

/// Builds a point read or a key-range scan.
#[derive(Debug)]
pub struct DmlSelectBuilder<'a> {
    desc: &'a TableDesc,
    targets: Vec<i32>,
    row_id: Option<Bytes>,
    key_values: Vec<SqlValue>,
    conditions: Vec<SqlOpExpr>,
    is_forward_scan: bool,
    limit: u64,
    paging_state: Option<PagingState>,
}

impl<'a> DmlSelectBuilder<'a> {
    /// Starts a forward scan of every column of `desc`.
    #[must_use]
    pub fn new(desc: &'a TableDesc) -> Self {
        Self {
            desc,
            targets: Vec::new(),
            row_id: None,
            key_values: Vec::new(),
            conditions: Vec::new(),
            is_forward_scan: true,
            limit: 0,
            paging_state: None,
        }
    }

    /// Returns a column; without targets every column is returned.
    pub fn add_target(&mut self, attr_num: i32) -> GateResult<&mut Self> {
        let field = self.desc.find_column(attr_num)?.field_index;
        self.targets.push(field_ref(field)?);
        Ok(self)
    }

    /// Reads the single row with this encoded key.
    pub fn bind_row_id(&mut self, row_id: Bytes) -> &mut Self {
        self.row_id = Some(row_id);
        self
    }

    /// Fixes the next leading key column to `value`.
    ///
    /// Key columns must be bound in key order.
    pub fn bind_key(&mut self, attr_num: i32, value: impl Into<SqlValue>) -> GateResult<&mut Self> {
        let column = self.desc.find_column(attr_num)?;
        let expected = self.key_values.len();
        if !column.is_primary || column.field_index != expected + SKV_FIELD_OFFSET {
            return Err(GateError::usage(format!(
                "column {} is not key column {expected} of {}",
                column.name,
                self.desc.table_name()
            )));
        }
        if !self.conditions.is_empty() {
            return Err(GateError::usage("key values must be bound before range conditions"));
        }
        self.key_values.push(value.into());
        Ok(self)
    }

    /// Adds a range condition `column <op> value` with `op` one of
    /// `Eq`, `Ge`, or `Le`.
    pub fn add_condition(
        &mut self,
        op: ExprOpcode,
        attr_num: i32,
        value: impl Into<SqlValue>,
    ) -> GateResult<&mut Self> {
        if !matches!(op, ExprOpcode::Eq | ExprOpcode::Ge | ExprOpcode::Le) {
            return Err(GateError::usage(format!("unsupported range operator {op:?}")));
        }
        let field = self.desc.find_column(attr_num)?.field_index;
        self.conditions.push(SqlOpExpr::compare(op, field_ref(field)?, value));
        Ok(self)
    }

    /// Adds `column BETWEEN low AND high`.
    pub fn add_between(
        &mut self,
        attr_num: i32,
        low: impl Into<SqlValue>,
        high: impl Into<SqlValue>,
    ) -> GateResult<&mut Self> {
        let field = self.desc.find_column(attr_num)?.field_index;
        self.conditions.push(SqlOpExpr::between(field_ref(field)?, low, high));
        Ok(self)
    }

    /// Scans in descending key order.
    pub fn set_reverse(&mut self, reverse: bool) -> &mut Self {
        self.is_forward_scan = !reverse;
        self
    }

    /// Rows per page; 0 uses the configured default.
    pub fn set_limit(&mut self, limit: u64) -> &mut Self {
        self.limit = limit;
        self
    }

    /// Continues a scan from a previous page.
    pub fn set_paging_state(&mut self, paging_state: PagingState) -> &mut Self {
        self.paging_state = Some(paging_state);
        self
    }

    /// Builds the operation.
    #[must_use]
    pub fn build(&self) -> PgOp {
        let desc = self.desc;
        let mut request =
            SqlOpReadRequest::new(desc.collection(), desc.table_id(), desc.schema_version());
        request.targets = self.targets.iter().map(|field| SqlOpExpr::column(*field)).collect();
        request.row_id = self.row_id.clone();
        request.key_column_values = self.key_values.iter().cloned().map(SqlOpExpr::Value).collect();
        if !self.conditions.is_empty() {
            request.condition_expr = Some(SqlOpExpr::and(self.conditions.clone()));
        }
        request.is_forward_scan = self.is_forward_scan;
        request.limit = self.limit;
        request.paging_state = self.paging_state.clone();
        PgOp::read(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ColumnSchema, DataType, TableInfo, TableSchema};

    fn desc() -> TableDesc {
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
        TableDesc::from_table(&TableInfo::new("ns", "db", "t1", "user_tags", 16384, schema))
    }

    #[test]
    fn test_insert_orders_keys_and_values() {
        let desc = desc();
        let mut builder = DmlWriteBuilder::new(&desc, StmtType::Insert).unwrap();
        builder.bind_column(4, true).unwrap().bind_column(2, 7).unwrap().bind_column(1, 3).unwrap();
        let PgOp::Write(op) = builder.build().unwrap() else { panic!("expected a write") };
        assert_eq!(op.request.key_column_values, vec![SqlOpExpr::value(3), SqlOpExpr::value(7)]);
        assert_eq!(op.request.column_values, vec![ColumnValue::new(3, SqlOpExpr::value(true))]);
        assert!(op.request.column_new_values.is_empty());
    }

    #[test]
    fn test_update_uses_new_values() {
        let desc = desc();
        let mut builder = DmlWriteBuilder::new(&desc, StmtType::Update).unwrap();
        builder.bind_row_id(Bytes::from_static(b"row")).bind_column(3, "x").unwrap();
        let PgOp::Write(op) = builder.build().unwrap() else { panic!("expected a write") };
        assert_eq!(op.request.row_id, Some(Bytes::from_static(b"row")));
        assert!(op.request.key_column_values.is_empty());
        assert_eq!(op.request.column_new_values, vec![ColumnValue::new(2, SqlOpExpr::value("x"))]);
    }

    #[test]
    fn test_write_needs_every_key() {
        let desc = desc();
        let mut builder = DmlWriteBuilder::new(&desc, StmtType::Delete).unwrap();
        builder.bind_column(1, 3).unwrap();
        assert!(matches!(builder.build(), Err(GateError::InvalidArgument { .. })));
        assert!(matches!(builder.bind_column(2, SqlValue::Null), Err(GateError::InvalidArgument { .. })));
        assert!(matches!(builder.bind_column(9, 1), Err(GateError::InvalidArgument { .. })));
        assert!(DmlWriteBuilder::new(&desc, StmtType::Truncate).is_err());
    }

    #[test]
    fn test_select_builds_range() {
        let desc = desc();
        let mut builder = DmlSelectBuilder::new(&desc);
        builder
            .add_target(3)
            .unwrap()
            .bind_key(1, 5)
            .unwrap()
            .add_between(2, 10, 20)
            .unwrap()
            .set_limit(4)
            .set_reverse(true);
        let PgOp::Read(op) = builder.build() else { panic!("expected a read") };
        assert_eq!(op.request.targets, vec![SqlOpExpr::column(2)]);
        assert_eq!(op.request.key_column_values, vec![SqlOpExpr::value(5)]);
        assert_eq!(
            op.request.condition_expr,
            Some(SqlOpExpr::and(vec![SqlOpExpr::between(1, 10, 20)]))
        );
        assert!(!op.request.is_forward_scan);
        assert_eq!(op.request.limit, 4);
    }

    #[test]
    fn test_select_key_order_is_enforced() {
        let desc = desc();
        let mut builder = DmlSelectBuilder::new(&desc);
        assert!(matches!(builder.bind_key(2, 1), Err(GateError::Usage { .. })));
        assert!(matches!(builder.bind_key(3, "x"), Err(GateError::Usage { .. })));
        builder.add_condition(ExprOpcode::Ge, 1, 1).unwrap();
        assert!(matches!(builder.bind_key(1, 1), Err(GateError::Usage { .. })));
        assert!(matches!(builder.add_condition(ExprOpcode::Lt, 2, 1), Err(GateError::Usage { .. })));
    }
}
