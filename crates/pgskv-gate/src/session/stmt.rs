//! DDL statements a session executes.

use pgskv_common::PgOid;

use crate::catalog::{AlterTableRequest, CreateIndexRequest, CreateTableRequest, NamespaceInfo};
use crate::entity::{IndexInfo, TableInfo};

/// A DDL statement.
#[derive(Debug, Clone)]
pub enum Statement {
    /// CREATE DATABASE.
    CreateDatabase {
        /// Database name.
        name: String,
        /// Database oid.
        oid: PgOid,
    },
    /// CREATE TABLE.
    CreateTable(CreateTableRequest),
    /// CREATE INDEX.
    CreateIndex(CreateIndexRequest),
    /// ALTER TABLE ADD/DROP COLUMN.
    AlterTable(AlterTableRequest),
    /// DROP TABLE.
    DropTable {
        /// Owning database.
        database_name: String,
        /// Table oid.
        table_oid: PgOid,
    },
    /// DROP INDEX.
    DropIndex {
        /// Owning database.
        database_name: String,
        /// Indexed table oid.
        base_table_oid: PgOid,
        /// Index oid.
        index_oid: PgOid,
    },
}

impl Statement {
    /// Statement name for logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateDatabase { .. } => "CREATE DATABASE",
            Self::CreateTable(_) => "CREATE TABLE",
            Self::CreateIndex(_) => "CREATE INDEX",
            Self::AlterTable(_) => "ALTER TABLE",
            Self::DropTable { .. } => "DROP TABLE",
            Self::DropIndex { .. } => "DROP INDEX",
        }
    }
}

/// Outcome of a DDL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum DdlResult {
    /// The created database.
    Database(NamespaceInfo),
    /// The created or altered table.
    Table(TableInfo),
    /// The created index.
    Index(IndexInfo),
    /// The object was dropped.
    Dropped,
}
