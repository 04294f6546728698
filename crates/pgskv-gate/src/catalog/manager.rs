//! Catalog manager: databases, DDL, and the catalog version.
//!
//! Every DDL call runs in a transaction of its own and bumps the catalog
//! version once it has committed, so sessions can tell that their cached
//! table descriptors are stale.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use pgskv_common::types::namespace_id;
use pgskv_common::{
    GateError, GateResult, PgObjectId, PgOid, TxnId, PRIMARY_CLUSTER_COLLECTION,
};
use tracing::{debug, info, warn};

use super::handler::CatalogHandler;
use crate::adapter::{check_status, Adapter, OpKind};
use crate::entity::{
    ColumnSchema, IndexColumn, IndexInfo, IndexPermissionPolicy, IndexPermissions,
    StepwiseBackfillPolicy, TableInfo, TableSchema,
};

/// A database registered with the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
    /// Namespace id; also the name of the database's collection.
    pub namespace_id: String,
    /// Database name.
    pub namespace_name: String,
    /// Relational database oid.
    pub database_oid: PgOid,
}

/// A new table.
#[derive(Debug, Clone)]
pub struct CreateTableRequest {
    /// Database the table belongs to.
    pub database_name: String,
    /// Table name.
    pub table_name: String,
    /// Relational oid of the table.
    pub table_oid: PgOid,
    /// Columns, key columns first.
    pub columns: Vec<ColumnSchema>,
    /// Part of the relational system catalog.
    pub is_sys_table: bool,
    /// Return the existing table instead of failing.
    pub if_not_exist: bool,
}

/// A new secondary index.
#[derive(Debug, Clone)]
pub struct CreateIndexRequest {
    /// Database the index belongs to.
    pub database_name: String,
    /// Index name.
    pub index_name: String,
    /// Relational oid of the index.
    pub index_oid: PgOid,
    /// Relational oid of the indexed table.
    pub base_table_oid: PgOid,
    /// Names of the indexed base columns, in key order.
    pub columns: Vec<String>,
    /// Unique index.
    pub is_unique: bool,
    /// Make the index readable right away instead of building it.
    pub skip_index_backfill: bool,
    /// Return the existing index instead of failing.
    pub if_not_exist: bool,
}

/// Column changes to one table.
#[derive(Debug, Clone, Default)]
pub struct AlterTableRequest {
    /// Database the table belongs to.
    pub database_name: String,
    /// Relational oid of the table.
    pub table_oid: PgOid,
    /// Value columns to add.
    pub add_columns: Vec<ColumnSchema>,
    /// Names of value columns to drop.
    pub drop_columns: Vec<String>,
}

/// Owns the database registry and runs DDL against the persisted catalog.
pub struct CatalogManager {
    adapter: Arc<Adapter>,
    handler: CatalogHandler,
    namespaces: RwLock<HashMap<String, NamespaceInfo>>,
    catalog_version: AtomicU64,
    policy: Arc<dyn IndexPermissionPolicy>,
}

impl CatalogManager {
    /// Creates a manager using the stepwise index build policy.
    #[must_use]
    pub fn new(adapter: Arc<Adapter>) -> Self {
        Self {
            handler: CatalogHandler::new(Arc::clone(&adapter)),
            adapter,
            namespaces: RwLock::new(HashMap::new()),
            catalog_version: AtomicU64::new(0),
            policy: Arc::new(StepwiseBackfillPolicy),
        }
    }

    /// Replaces the policy that advances index builds.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn IndexPermissionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Catalog persistence.
    #[must_use]
    pub fn handler(&self) -> &CatalogHandler {
        &self.handler
    }

    /// Adapter all catalog requests go through.
    #[must_use]
    pub fn adapter(&self) -> &Arc<Adapter> {
        &self.adapter
    }

    /// Current catalog version; grows with every committed DDL.
    #[inline]
    #[must_use]
    pub fn catalog_version(&self) -> u64 {
        self.catalog_version.load(Ordering::Acquire)
    }

    fn bump_catalog_version(&self) -> u64 {
        let version = self.catalog_version.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(version, "catalog version bumped");
        version
    }

    /// Runs `f` in a fresh transaction, committing on success and aborting
    /// on failure.
    pub fn with_txn<T>(&self, f: impl FnOnce(TxnId) -> GateResult<T>) -> GateResult<T> {
        let timeout = self.adapter.config().txn_timeout;
        let txn = self.adapter.begin_transaction(timeout).wait()?;
        match f(txn) {
            Ok(value) => {
                self.adapter.end_transaction(txn, true).wait()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort) = self.adapter.end_transaction(txn, false).wait() {
                    warn!(%txn, error = %abort, "abort after catalog failure failed");
                }
                Err(e)
            }
        }
    }

    // =========================================================================
    // Databases
    // =========================================================================

    /// Creates the primary cluster collection and its sys tables.
    ///
    /// Safe to call on every start.
    pub fn init_primary_cluster(&self) -> GateResult<()> {
        self.create_collection_if_missing(PRIMARY_CLUSTER_COLLECTION, "primary cluster")?;
        self.handler.check_and_create_sys_tables_if_necessary(PRIMARY_CLUSTER_COLLECTION)?;
        info!(collection = PRIMARY_CLUSTER_COLLECTION, "primary cluster initialized");
        Ok(())
    }

    fn create_collection_if_missing(&self, collection: &str, namespace_name: &str) -> GateResult<()> {
        let status = self.adapter.create_collection(collection, namespace_name)?.wait();
        if status.code == 409 {
            debug!(%collection, "collection already exists");
            return Ok(());
        }
        check_status(&status, OpKind::Other)
    }

    /// Creates a database: its collection, its sys tables, and its registry
    /// entry.
    pub fn create_namespace(&self, name: &str, database_oid: PgOid) -> GateResult<NamespaceInfo> {
        if self.namespaces.read().contains_key(name) {
            return Err(GateError::already_exists(format!("database {name}")));
        }
        let namespace = NamespaceInfo {
            namespace_id: namespace_id(database_oid),
            namespace_name: name.to_string(),
            database_oid,
        };
        self.create_collection_if_missing(&namespace.namespace_id, name)?;
        self.handler.check_and_create_sys_tables_if_necessary(&namespace.namespace_id)?;

        let mut namespaces = self.namespaces.write();
        if namespaces.contains_key(name) {
            return Err(GateError::already_exists(format!("database {name}")));
        }
        namespaces.insert(name.to_string(), namespace.clone());
        drop(namespaces);

        self.bump_catalog_version();
        info!(database = %name, oid = database_oid, id = %namespace.namespace_id, "created database");
        Ok(namespace)
    }

    /// Looks a database up by name.
    pub fn get_namespace(&self, name: &str) -> GateResult<NamespaceInfo> {
        self.namespaces
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| GateError::not_found(format!("database {name}")))
    }

    /// Every registered database, ordered by name.
    #[must_use]
    pub fn list_namespaces(&self) -> Vec<NamespaceInfo> {
        let mut namespaces: Vec<_> = self.namespaces.read().values().cloned().collect();
        namespaces.sort_by(|a, b| a.namespace_name.cmp(&b.namespace_name));
        namespaces
    }

    // =========================================================================
    // Tables
    // =========================================================================

    /// Creates and persists a table.
    pub fn create_table(&self, request: CreateTableRequest) -> GateResult<TableInfo> {
        let namespace = self.get_namespace(&request.database_name)?;
        let table_id = PgObjectId::new(namespace.database_oid, request.table_oid).table_id();
        let schema = TableSchema::with_sequential_ids(request.columns, 1)?;
        let mut table = TableInfo::new(
            namespace.namespace_id.clone(),
            namespace.namespace_name.clone(),
            table_id.clone(),
            request.table_name,
            request.table_oid,
            schema,
        );
        table.is_sys_table = request.is_sys_table;

        let created = self.with_txn(|txn| {
            if self.handler.check_table_exists(txn, &namespace.namespace_id, &table_id)? {
                if request.if_not_exist {
                    let existing = self.handler.get_table(
                        txn,
                        &namespace.namespace_id,
                        &namespace.namespace_name,
                        &table_id,
                    )?;
                    return Ok((existing, false));
                }
                return Err(GateError::already_exists(format!("table {}", table.table_name)));
            }
            self.handler.create_or_update_table(txn, &table)?;
            Ok((table, true))
        })?;

        let (table, is_new) = created;
        if is_new {
            self.bump_catalog_version();
            info!(table = %table.table_id, name = %table.table_name, columns = table.schema.num_columns(), "created table");
        }
        Ok(table)
    }

    /// Loads a table by oid.
    pub fn get_table(&self, database_name: &str, table_oid: PgOid) -> GateResult<TableInfo> {
        let namespace = self.get_namespace(database_name)?;
        let table_id = PgObjectId::new(namespace.database_oid, table_oid).table_id();
        self.get_table_by_id(&namespace, &table_id)
    }

    /// Loads a table by table id.
    pub fn get_table_by_id(&self, namespace: &NamespaceInfo, table_id: &str) -> GateResult<TableInfo> {
        self.with_txn(|txn| {
            self.handler.get_table(txn, &namespace.namespace_id, &namespace.namespace_name, table_id)
        })
    }

    /// Every user table of a database.
    pub fn list_tables(&self, database_name: &str) -> GateResult<Vec<TableInfo>> {
        let namespace = self.get_namespace(database_name)?;
        self.with_txn(|txn| {
            self.handler.list_tables(txn, &namespace.namespace_id, &namespace.namespace_name, false)
        })
    }

    /// Adds and drops value columns, creating a new schema version.
    pub fn alter_table(&self, request: AlterTableRequest) -> GateResult<TableInfo> {
        let mut table = self.get_table(&request.database_name, request.table_oid)?;
        if request.add_columns.is_empty() && request.drop_columns.is_empty() {
            return Ok(table);
        }
        for name in &request.drop_columns {
            table.drop_column(name)?;
        }
        for column in request.add_columns {
            if column.is_primary {
                return Err(GateError::not_supported(format!("adding key column {}", column.name)));
            }
            table.add_column(column)?;
        }
        self.with_txn(|txn| self.handler.create_or_update_table(txn, &table))?;
        self.bump_catalog_version();
        info!(table = %table.table_id, version = table.schema_version(), "altered table");
        Ok(table)
    }

    /// Drops a table and its indexes.
    pub fn drop_table(&self, database_name: &str, table_oid: PgOid) -> GateResult<()> {
        let table = self.get_table(database_name, table_oid)?;
        self.with_txn(|txn| self.handler.delete_table(txn, &table))?;
        self.bump_catalog_version();
        Ok(())
    }

    // =========================================================================
    // Indexes
    // =========================================================================

    /// Creates and persists an index over an existing table.
    ///
    /// With `skip_index_backfill` the index starts out readable; otherwise
    /// it starts in `DeleteOnly` and is advanced by the build policy.
    pub fn create_index(&self, request: CreateIndexRequest) -> GateResult<IndexInfo> {
        let namespace = self.get_namespace(&request.database_name)?;
        let mut table = self.get_table(&request.database_name, request.base_table_oid)?;
        let index_id = PgObjectId::new(namespace.database_oid, request.index_oid).table_id();
        if let Some(existing) = table.index(&index_id) {
            if request.if_not_exist {
                return Ok(existing.clone());
            }
            return Err(GateError::already_exists(format!("index {}", request.index_name)));
        }

        let columns = request
            .columns
            .iter()
            .enumerate()
            .map(|(position, name)| index_column(&table, position, name))
            .collect::<GateResult<Vec<_>>>()?;
        let permissions = if request.skip_index_backfill {
            IndexPermissions::ReadWriteAndDelete
        } else {
            IndexPermissions::DeleteOnly
        };
        let index = IndexInfo::new(
            index_id,
            request.index_name,
            request.index_oid,
            table.table_id.clone(),
            request.is_unique,
            columns,
        )
        .with_permissions(permissions);
        table.add_index(index.clone())?;

        self.with_txn(|txn| self.handler.persist_index_table(txn, &table, &index))?;
        self.bump_catalog_version();
        info!(index = %index.table_id, table = %table.table_id, %permissions, "created index");
        Ok(index)
    }

    /// Drops one index of a table.
    pub fn drop_index(&self, database_name: &str, base_table_oid: PgOid, index_oid: PgOid) -> GateResult<()> {
        let namespace = self.get_namespace(database_name)?;
        let table = self.get_table(database_name, base_table_oid)?;
        let index_id = PgObjectId::new(namespace.database_oid, index_oid).table_id();
        if table.index(&index_id).is_none() {
            return Err(GateError::not_found(format!("index {index_oid} of table {base_table_oid}")));
        }
        self.with_txn(|txn| self.handler.delete_index(txn, &namespace.namespace_id, &index_id))?;
        self.bump_catalog_version();
        Ok(())
    }

    /// Moves an index to `permissions`.
    pub fn update_index_permissions(
        &self,
        table: &TableInfo,
        index_id: &str,
        permissions: IndexPermissions,
    ) -> GateResult<IndexInfo> {
        let index = self
            .with_txn(|txn| self.handler.update_index_permissions(txn, table, index_id, permissions))?;
        self.bump_catalog_version();
        Ok(index)
    }

    /// Advances every index of a table by one policy step.
    ///
    /// Returns the indexes that moved.
    pub fn async_update_index_permissions(
        &self,
        database_name: &str,
        table_oid: PgOid,
    ) -> GateResult<Vec<IndexInfo>> {
        let table = self.get_table(database_name, table_oid)?;
        let mut moved = Vec::new();
        for index in table.indexes.values() {
            if let Some(next) = self.policy.next(index) {
                moved.push(self.update_index_permissions(&table, &index.table_id, next)?);
            }
        }
        Ok(moved)
    }

    /// Drives an index with the build policy until it reaches `target`.
    ///
    /// Returns the permissions reached, which are below `target` only if
    /// the policy stopped advancing first.
    pub fn wait_until_index_permissions_at_least(
        &self,
        database_name: &str,
        table_oid: PgOid,
        index_id: &str,
        target: IndexPermissions,
    ) -> GateResult<IndexPermissions> {
        loop {
            let table = self.get_table(database_name, table_oid)?;
            let index = table
                .index(index_id)
                .ok_or_else(|| GateError::not_found(format!("index {index_id} of table {table_oid}")))?;
            let current = index.index_permissions;
            if current >= target {
                return Ok(current);
            }
            let Some(next) = self.policy.next(index) else {
                warn!(index = %index_id, %current, %target, "index build stalled below target");
                return Ok(current);
            };
            self.update_index_permissions(&table, index_id, next)?;
        }
    }
}

impl std::fmt::Debug for CatalogManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogManager")
            .field("namespaces", &self.namespaces.read().len())
            .field("catalog_version", &self.catalog_version())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn index_column(table: &TableInfo, position: usize, name: &str) -> GateResult<IndexColumn> {
    let idx = table
        .schema
        .find_column(name)
        .ok_or_else(|| GateError::invalid_argument(format!("column {name} of {}", table.table_name)))?;
    let base = &table.schema.columns()[idx];
    let order = i32::try_from(position + 1)
        .map_err(|_| GateError::invalid_argument("too many index columns"))?;
    Ok(IndexColumn {
        column_id: order - 1,
        column_name: base.name.clone(),
        data_type: base.data_type,
        is_nullable: base.is_nullable,
        is_partition: position == 0,
        order,
        sorting_type: base.sorting_type,
        base_column_id: table.schema.column_ids()[idx],
    })
}
