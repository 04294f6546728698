//! Operation descriptors exchanged with the relational engine.
//!
//! A [`PgOp`] pairs a request with the response the adapter fills in. Column
//! ids in requests are key-value field positions; a [`TableDesc`] turns
//! attribute numbers into them.
//!
//! [`TableDesc`]: crate::entity::TableDesc

use bytes::Bytes;
use pgskv_store::{Query, SkvRecord};

use super::expr::SqlOpExpr;

// =============================================================================
// Requests
// =============================================================================

/// Statement kind of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StmtType {
    /// Read rows.
    Select,
    /// Insert; fails if the row exists.
    Insert,
    /// Insert or overwrite.
    Upsert,
    /// Overwrite the changed fields of an existing row.
    Update,
    /// Erase a row.
    Delete,
    /// Erase every row of a table.
    Truncate,
}

/// A value bound to a field position.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnValue {
    /// Field position.
    pub column_id: usize,
    /// Bound expression; writes accept literals only.
    pub expr: SqlOpExpr,
}

impl ColumnValue {
    /// Binds `expr` to field `column_id`.
    #[must_use]
    pub fn new(column_id: usize, expr: SqlOpExpr) -> Self {
        Self { column_id, expr }
    }
}

/// Continuation of a paged scan.
///
/// Hand it back in the next read request to continue after the last row
/// returned.
#[derive(Debug, Clone, PartialEq)]
pub struct PagingState {
    pub(crate) query: Query,
    total_num_rows_read: u64,
}

impl PagingState {
    pub(crate) fn new(query: Query, total_num_rows_read: u64) -> Self {
        Self { query, total_num_rows_read }
    }

    /// Rows returned by all pages so far.
    #[inline]
    #[must_use]
    pub fn total_num_rows_read(&self) -> u64 {
        self.total_num_rows_read
    }
}

/// A read against one table or index.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlOpReadRequest {
    /// Collection holding the rows.
    pub collection: String,
    /// Table or index id, which is also the schema name.
    pub table_id: String,
    /// Schema version the request was built against.
    pub schema_version: u32,
    /// Encoded key of a single row; skips range derivation.
    pub row_id: Option<Bytes>,
    /// Columns to return; empty returns every column.
    pub targets: Vec<SqlOpExpr>,
    /// Literals for the leading key fields.
    pub key_column_values: Vec<SqlOpExpr>,
    /// Range predicate over the key fields following `key_column_values`.
    pub condition_expr: Option<SqlOpExpr>,
    /// General predicate; not supported.
    pub where_expr: Option<SqlOpExpr>,
    /// Scan in key order, otherwise in reverse.
    pub is_forward_scan: bool,
    /// Rows per page; 0 falls back to the configured default.
    pub limit: u64,
    /// Continuation from the previous page.
    pub paging_state: Option<PagingState>,
}

impl SqlOpReadRequest {
    /// A forward scan of every row of `table_id`.
    pub fn new(collection: impl Into<String>, table_id: impl Into<String>, schema_version: u32) -> Self {
        Self {
            collection: collection.into(),
            table_id: table_id.into(),
            schema_version,
            row_id: None,
            targets: Vec::new(),
            key_column_values: Vec::new(),
            condition_expr: None,
            where_expr: None,
            is_forward_scan: true,
            limit: 0,
            paging_state: None,
        }
    }
}

/// A write against one table or index.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlOpWriteRequest {
    /// Collection holding the rows.
    pub collection: String,
    /// Table or index id, which is also the schema name.
    pub table_id: String,
    /// Schema version the request was built against.
    pub schema_version: u32,
    /// Statement kind.
    pub stmt_type: StmtType,
    /// Encoded key of the row; replaces `key_column_values`.
    pub row_id: Option<Bytes>,
    /// Literals for every key field, in field order.
    pub key_column_values: Vec<SqlOpExpr>,
    /// Non-key values for insert, upsert and delete.
    pub column_values: Vec<ColumnValue>,
    /// Changed values for update.
    pub column_new_values: Vec<ColumnValue>,
    /// Returning list; not supported.
    pub targets: Vec<SqlOpExpr>,
    /// Not supported.
    pub where_expr: Option<SqlOpExpr>,
    /// Not supported.
    pub condition_expr: Option<SqlOpExpr>,
}

impl SqlOpWriteRequest {
    /// An empty write of kind `stmt_type`.
    pub fn new(
        collection: impl Into<String>,
        table_id: impl Into<String>,
        schema_version: u32,
        stmt_type: StmtType,
    ) -> Self {
        Self {
            collection: collection.into(),
            table_id: table_id.into(),
            schema_version,
            stmt_type,
            row_id: None,
            key_column_values: Vec::new(),
            column_values: Vec::new(),
            column_new_values: Vec::new(),
            targets: Vec::new(),
            where_expr: None,
            condition_expr: None,
        }
    }
}

// =============================================================================
// Responses
// =============================================================================

/// Result of a completed operation.
///
/// Failed operations resolve to an error instead; its
/// [`request_status`](pgskv_common::GateError::request_status) is the
/// relational status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlOpResponse {
    /// Rows read, in scan order.
    pub rows: Vec<SkvRecord>,
    /// Set while the scan has more pages.
    pub paging_state: Option<PagingState>,
    /// Rows written.
    pub rows_affected_count: u64,
}

/// A read request and its response.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOp {
    /// Request.
    pub request: SqlOpReadRequest,
    /// Filled in by the adapter.
    pub response: SqlOpResponse,
}

/// A write request and its response.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    /// Request.
    pub request: SqlOpWriteRequest,
    /// Filled in by the adapter.
    pub response: SqlOpResponse,
}

/// An operation handed to the adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum PgOp {
    /// Read.
    Read(ReadOp),
    /// Write.
    Write(WriteOp),
}

impl PgOp {
    /// Wraps a read request.
    #[must_use]
    pub fn read(request: SqlOpReadRequest) -> Self {
        Self::Read(ReadOp { request, response: SqlOpResponse::default() })
    }

    /// Wraps a write request.
    #[must_use]
    pub fn write(request: SqlOpWriteRequest) -> Self {
        Self::Write(WriteOp { request, response: SqlOpResponse::default() })
    }

    /// Returns true for reads.
    #[inline]
    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(self, Self::Read(_))
    }

    /// Table or index the operation targets.
    #[must_use]
    pub fn table_id(&self) -> &str {
        match self {
            Self::Read(op) => &op.request.table_id,
            Self::Write(op) => &op.request.table_id,
        }
    }

    /// Response filled in by the adapter.
    #[must_use]
    pub fn response(&self) -> &SqlOpResponse {
        match self {
            Self::Read(op) => &op.response,
            Self::Write(op) => &op.response,
        }
    }

    /// Consumes the operation and returns its response.
    #[must_use]
    pub fn into_response(self) -> SqlOpResponse {
        match self {
            Self::Read(op) => op.response,
            Self::Write(op) => op.response,
        }
    }
}
