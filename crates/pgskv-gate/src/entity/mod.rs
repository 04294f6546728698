//! Relational metadata entities.
//!
//! These are the catalog's in-memory view of tables and indexes:
//!
//! - [`TableInfo`] / [`TableSchema`] / [`ColumnSchema`]: a table and its columns
//! - [`IndexInfo`] / [`IndexColumn`]: a secondary index and its build state
//! - [`TableDesc`]: the per-session descriptor operations are built from

mod desc;
mod index;
mod schema;
mod table;
mod types;

pub use desc::{ColumnDesc, TableDesc};
pub use index::{
    IndexColumn, IndexInfo, IndexPermissionPolicy, IndexPermissions, StepwiseBackfillPolicy,
};
pub use schema::{ColumnSchema, TableSchema};
pub use table::TableInfo;
pub use types::{DataType, SortingType};
