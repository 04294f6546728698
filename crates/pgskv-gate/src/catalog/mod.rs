//! Persisted relational catalog.
//!
//! - [`sys_tables`]: layouts of the three sys schemas
//! - [`codec`]: tables and indexes to and from sys records
//! - [`CatalogHandler`]: reads and writes sys records in a transaction
//! - [`CatalogManager`]: databases, DDL, and the catalog version

pub mod codec;
mod handler;
mod manager;
pub mod sys_tables;

pub use handler::CatalogHandler;
pub use manager::{
    AlterTableRequest, CatalogManager, CreateIndexRequest, CreateTableRequest, NamespaceInfo,
};
