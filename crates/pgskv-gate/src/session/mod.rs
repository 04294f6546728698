//! Session orchestrator.
//!
//! A session is one relational connection. It tracks the connected
//! database, the open transaction, and per-connection caches:
//!
//! ```text
//!  Disconnected ──connect_database──▶ Connected(db)
//!                                        │
//!                 ┌──────────────────────┼─────────────────────────┐
//!                 ▼                      ▼                         ▼
//!         load_table / DDL          run_op(op) ──buffered?──▶ write buffer
//!         (desc cache)                   │                         │ flush, in order
//!                                        ▼                         ▼
//!                                  Adapter::exec ◀─────────────────┘
//!                                        │
//!                          commit / abort / restart (TxnHandler)
//! ```
//!
//! Reads and non-bufferable writes flush pending writes before they run,
//! so operations reach the store in the order the session issued them.

mod buffer;
mod dml;
mod memctx;
mod stmt;
mod txn;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pgskv_common::{
    GateError, GateResult, PgObjectId, PgOid, StatementId, TxnId, FIRST_STATEMENT_ID,
};
use tracing::{debug, info, warn};

use crate::adapter::{Adapter, OpFuture, PgOp, SqlValue};
use crate::catalog::{
    AlterTableRequest, CatalogManager, CreateIndexRequest, CreateTableRequest, NamespaceInfo,
};
use crate::entity::{IndexInfo, IndexPermissions, TableDesc, TableInfo};

pub use buffer::{FkCache, WriteBuffer};
pub use dml::{DmlSelectBuilder, DmlWriteBuilder};
pub use memctx::{Handle, MemoryContext, MemoryContextRegistry};
pub use stmt::{DdlResult, Statement};
pub use txn::{TxnHandler, TxnState};

/// Unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    /// Creates a new session id.
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric id.
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session_{}", self.0)
    }
}

/// A cached table and its descriptor.
#[derive(Debug, Clone)]
struct CachedTable {
    info: Arc<TableInfo>,
    desc: Arc<TableDesc>,
}

/// One relational connection.
pub struct Session {
    id: SessionId,
    manager: Arc<CatalogManager>,
    adapter: Arc<Adapter>,
    connected: Option<NamespaceInfo>,
    txn: TxnHandler,
    buffer: WriteBuffer,
    fk_cache: FkCache,
    /// Keyed by table id.
    tables: HashMap<String, CachedTable>,
    /// Index descriptors keyed by index table id.
    index_descs: HashMap<String, Arc<TableDesc>>,
    cached_catalog_version: u64,
    next_statement_id: u64,
    memory_contexts: MemoryContextRegistry,
}

impl Session {
    /// Opens a disconnected session.
    pub fn new(id: SessionId, manager: Arc<CatalogManager>) -> Self {
        let adapter = Arc::clone(manager.adapter());
        let timeout = adapter.config().txn_timeout;
        debug!(session = %id, "session opened");
        Self {
            id,
            txn: TxnHandler::new(Arc::clone(&adapter), timeout),
            adapter,
            manager,
            connected: None,
            buffer: WriteBuffer::default(),
            fk_cache: FkCache::default(),
            tables: HashMap::new(),
            index_descs: HashMap::new(),
            cached_catalog_version: 0,
            next_statement_id: FIRST_STATEMENT_ID,
            memory_contexts: MemoryContextRegistry::default(),
        }
    }

    /// Session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Catalog this session runs DDL through.
    #[must_use]
    pub fn catalog(&self) -> &Arc<CatalogManager> {
        &self.manager
    }

    /// Memory contexts of this connection.
    pub fn memory_contexts(&mut self) -> &mut MemoryContextRegistry {
        &mut self.memory_contexts
    }

    // =========================================================================
    // Databases and DDL
    // =========================================================================

    /// Bootstraps the primary cluster; safe to repeat.
    pub fn init_primary_cluster(&self) -> GateResult<()> {
        self.manager.init_primary_cluster()
    }

    /// Creates a database.
    pub fn create_database(&self, name: &str, oid: PgOid) -> GateResult<NamespaceInfo> {
        self.manager.create_namespace(name, oid)
    }

    /// Connects to a database, dropping every per-database cache.
    pub fn connect_database(&mut self, name: &str) -> GateResult<()> {
        let namespace = self.manager.get_namespace(name)?;
        self.invalidate_cache();
        info!(session = %self.id, database = %name, "connected");
        self.connected = Some(namespace);
        Ok(())
    }

    /// Disconnects from the current database.
    pub fn reset_connected_database(&mut self) {
        self.invalidate_cache();
        self.connected = None;
    }

    /// The connected database, if any.
    #[must_use]
    pub fn connected_database(&self) -> Option<&NamespaceInfo> {
        self.connected.as_ref()
    }

    fn namespace(&self) -> GateResult<&NamespaceInfo> {
        self.connected
            .as_ref()
            .ok_or_else(|| GateError::usage(format!("{} is not connected to a database", self.id)))
    }

    /// Creates a table.
    pub fn create_table(&mut self, request: CreateTableRequest) -> GateResult<TableInfo> {
        self.manager.create_table(request)
    }

    /// Creates an index.
    pub fn create_index(&mut self, request: CreateIndexRequest) -> GateResult<IndexInfo> {
        let base_table_id = self.table_id_in(&request.database_name, request.base_table_oid);
        let index = self.manager.create_index(request)?;
        if let Some(table_id) = base_table_id {
            self.invalidate_table_cache(&table_id);
        }
        Ok(index)
    }

    /// Adds and drops columns of a table.
    pub fn alter_table(&mut self, request: AlterTableRequest) -> GateResult<TableInfo> {
        let table = self.manager.alter_table(request)?;
        self.invalidate_table_cache(&table.table_id);
        Ok(table)
    }

    /// Drops a table and its indexes.
    pub fn drop_table(&mut self, database_name: &str, table_oid: PgOid) -> GateResult<()> {
        self.manager.drop_table(database_name, table_oid)?;
        if let Some(table_id) = self.table_id_in(database_name, table_oid) {
            self.invalidate_table_cache(&table_id);
        }
        Ok(())
    }

    /// Drops an index.
    pub fn drop_index(
        &mut self,
        database_name: &str,
        base_table_oid: PgOid,
        index_oid: PgOid,
    ) -> GateResult<()> {
        self.manager.drop_index(database_name, base_table_oid, index_oid)?;
        if let Some(table_id) = self.table_id_in(database_name, base_table_oid) {
            self.invalidate_table_cache(&table_id);
        }
        Ok(())
    }

    /// Runs one DDL statement.
    pub fn execute_ddl(&mut self, statement: Statement) -> GateResult<DdlResult> {
        debug!(session = %self.id, statement = statement.name(), "executing ddl");
        match statement {
            Statement::CreateDatabase { name, oid } => {
                self.create_database(&name, oid).map(DdlResult::Database)
            }
            Statement::CreateTable(request) => self.create_table(request).map(DdlResult::Table),
            Statement::CreateIndex(request) => self.create_index(request).map(DdlResult::Index),
            Statement::AlterTable(request) => self.alter_table(request).map(DdlResult::Table),
            Statement::DropTable { database_name, table_oid } => {
                self.drop_table(&database_name, table_oid).map(|()| DdlResult::Dropped)
            }
            Statement::DropIndex { database_name, base_table_oid, index_oid } => self
                .drop_index(&database_name, base_table_oid, index_oid)
                .map(|()| DdlResult::Dropped),
        }
    }

    /// Current catalog version.
    #[must_use]
    pub fn get_catalog_master_version(&self) -> u64 {
        self.manager.catalog_version()
    }

    /// Drives an index build until it reaches `target`.
    pub fn wait_until_index_permissions_at_least(
        &mut self,
        table_oid: PgOid,
        index_oid: PgOid,
        target: IndexPermissions,
    ) -> GateResult<IndexPermissions> {
        let namespace = self.namespace()?.clone();
        let table_id = PgObjectId::new(namespace.database_oid, table_oid).table_id();
        let index_id = PgObjectId::new(namespace.database_oid, index_oid).table_id();
        let reached = self.manager.wait_until_index_permissions_at_least(
            &namespace.namespace_name,
            table_oid,
            &index_id,
            target,
        )?;
        self.invalidate_table_cache(&table_id);
        Ok(reached)
    }

    /// Advances every index of a table by one build step.
    pub fn async_update_index_permissions(&mut self, table_oid: PgOid) -> GateResult<Vec<IndexInfo>> {
        let namespace = self.namespace()?.clone();
        let moved = self.manager.async_update_index_permissions(&namespace.namespace_name, table_oid)?;
        if !moved.is_empty() {
            let table_id = PgObjectId::new(namespace.database_oid, table_oid).table_id();
            self.invalidate_table_cache(&table_id);
        }
        Ok(moved)
    }

    fn table_id_in(&self, database_name: &str, table_oid: PgOid) -> Option<String> {
        self.manager
            .get_namespace(database_name)
            .ok()
            .map(|ns| PgObjectId::new(ns.database_oid, table_oid).table_id())
    }

    // =========================================================================
    // Table Cache
    // =========================================================================

    fn check_catalog_version(&mut self) {
        let version = self.manager.catalog_version();
        if version != self.cached_catalog_version {
            if !self.tables.is_empty() || !self.index_descs.is_empty() {
                debug!(session = %self.id, cached = self.cached_catalog_version, version, "catalog changed, dropping table cache");
            }
            self.tables.clear();
            self.index_descs.clear();
            self.memory_contexts.clear_table_descs();
            self.cached_catalog_version = version;
        }
    }

    fn cached_table(&mut self, table_oid: PgOid) -> GateResult<CachedTable> {
        self.check_catalog_version();
        let namespace = self.namespace()?.clone();
        let table_id = PgObjectId::new(namespace.database_oid, table_oid).table_id();
        if let Some(cached) = self.tables.get(&table_id) {
            return Ok(cached.clone());
        }
        let info = self.manager.get_table_by_id(&namespace, &table_id)?;
        let cached = CachedTable {
            desc: Arc::new(TableDesc::from_table(&info)),
            info: Arc::new(info),
        };
        self.tables.insert(table_id, cached.clone());
        Ok(cached)
    }

    /// Descriptor of a table of the connected database.
    pub fn load_table(&mut self, table_oid: PgOid) -> GateResult<Arc<TableDesc>> {
        self.cached_table(table_oid).map(|cached| cached.desc)
    }

    /// Catalog entry of a table of the connected database.
    pub fn table_info(&mut self, table_oid: PgOid) -> GateResult<Arc<TableInfo>> {
        self.cached_table(table_oid).map(|cached| cached.info)
    }

    /// Descriptor of an index of a table of the connected database.
    pub fn index_desc(&mut self, table_oid: PgOid, index_oid: PgOid) -> GateResult<Arc<TableDesc>> {
        let cached = self.cached_table(table_oid)?;
        let namespace = self.namespace()?;
        let index_id = PgObjectId::new(namespace.database_oid, index_oid).table_id();
        if let Some(desc) = self.index_descs.get(&index_id) {
            return Ok(Arc::clone(desc));
        }
        let index = cached.info.index(&index_id).ok_or_else(|| {
            GateError::not_found(format!("index {index_oid} of table {}", cached.info.table_name))
        })?;
        let desc = Arc::new(TableDesc::from_index(index, namespace.namespace_id.clone()));
        self.index_descs.insert(index_id, Arc::clone(&desc));
        Ok(desc)
    }

    /// Forgets one table and its index descriptors.
    pub fn invalidate_table_cache(&mut self, table_id: &str) {
        if let Some(cached) = self.tables.remove(table_id) {
            for index_id in cached.info.indexes.keys() {
                self.index_descs.remove(index_id);
            }
        }
        self.index_descs.retain(|_, desc| desc.base_table_id() != Some(table_id));
        self.memory_contexts.clear_table_descs();
    }

    /// Forgets every cached table and foreign-key reference.
    pub fn invalidate_cache(&mut self) {
        self.tables.clear();
        self.index_descs.clear();
        self.fk_cache.clear();
        self.memory_contexts.clear_table_descs();
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Transaction state.
    #[must_use]
    pub fn txn_state(&self) -> TxnState {
        self.txn.state()
    }

    /// Begins a transaction.
    pub fn begin_transaction(&mut self) -> GateResult<TxnId> {
        self.txn.begin_transaction()
    }

    /// Flushes buffered writes and commits, then clears the foreign-key
    /// cache.
    ///
    /// If the flush fails the transaction is aborted instead.
    pub fn commit_transaction(&mut self) -> GateResult<()> {
        if self.txn.is_active() && !self.buffer.is_empty() {
            if let Err(e) = self.flush_pending() {
                self.abort_transaction()?;
                return Err(e);
            }
        }
        let result = self.txn.commit_transaction();
        self.fk_cache.clear();
        result
    }

    /// Drops buffered writes, clears the foreign-key cache and aborts.
    pub fn abort_transaction(&mut self) -> GateResult<()> {
        if !self.buffer.is_empty() {
            debug!(session = %self.id, dropped = self.buffer.len(), "dropping buffered writes on abort");
        }
        self.buffer.clear();
        self.fk_cache.clear();
        self.txn.abort_transaction()
    }

    /// Aborts and begins a new transaction.
    pub fn restart_transaction(&mut self) -> GateResult<TxnId> {
        self.buffer.clear();
        self.fk_cache.clear();
        self.txn.restart_transaction()
    }

    /// Deadline for transactions begun from now on.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.txn.set_timeout(timeout);
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Runs an operation against `desc` in the open transaction, beginning
    /// one if needed.
    ///
    /// Returns `None` when the write was buffered. Reads, writes with
    /// `force_non_bufferable`, and writes while buffering is off run at
    /// once, after any pending writes.
    pub fn run_op(
        &mut self,
        op: PgOp,
        desc: &TableDesc,
        force_non_bufferable: bool,
    ) -> GateResult<Option<OpFuture>> {
        if op.table_id() != desc.table_id() {
            return Err(GateError::usage(format!(
                "operation targets {} but was issued against {}",
                op.table_id(),
                desc.table_id()
            )));
        }
        let txn = self.txn.current_or_begin()?;

        if op.is_read() || force_non_bufferable || !self.buffer.is_enabled() {
            if !self.buffer.is_empty() {
                self.flush_pending()?;
            }
            return self.adapter.exec(txn, op).map(Some);
        }

        if self.buffer.touches_same_row(&op) {
            debug!(session = %self.id, table = %desc.table_id(), "write hits a buffered row, flushing");
            self.flush_pending()?;
        }
        self.buffer.push(op)?;
        Ok(None)
    }

    /// Runs pending writes in order and waits for each.
    ///
    /// On failure the remaining writes are dropped.
    fn flush_pending(&mut self) -> GateResult<()> {
        let ops = self.buffer.take()?;
        if ops.is_empty() {
            return Ok(());
        }
        let txn = self.txn.txn_id()?;
        debug!(session = %self.id, %txn, count = ops.len(), "flushing buffered writes");
        for op in ops {
            let future = self.adapter.exec(txn, op)?;
            self.wait_op(future)?;
        }
        Ok(())
    }

    /// Waits for an operation started by [`Session::run_op`].
    ///
    /// A timeout or an invalid-transaction result means the substrate has
    /// ended the transaction: the session drops its buffered writes and
    /// foreign-key cache and moves to `Aborted`.
    pub fn wait_op(&mut self, future: OpFuture) -> GateResult<PgOp> {
        let result = future.wait();
        if let Err(e @ (GateError::Timeout { .. } | GateError::InvalidTransaction { .. })) = &result {
            if self.txn.is_active() {
                warn!(session = %self.id, error = %e, "transaction lost");
                self.buffer.clear();
                self.fk_cache.clear();
                self.txn.mark_aborted();
            }
        }
        result
    }

    /// Starts buffering writes.
    pub fn start_operations_buffering(&mut self) -> GateResult<()> {
        self.buffer.enable()
    }

    /// Stops buffering and runs the pending writes.
    pub fn stop_operations_buffering(&mut self) -> GateResult<()> {
        let ops = self.buffer.disable()?;
        if ops.is_empty() {
            return Ok(());
        }
        let txn = self.txn.txn_id()?;
        for op in ops {
            let future = self.adapter.exec(txn, op)?;
            self.wait_op(future)?;
        }
        Ok(())
    }

    /// Runs the pending writes and keeps buffering.
    pub fn flush_buffered_operations(&mut self) -> GateResult<()> {
        if !self.buffer.is_enabled() {
            return Err(GateError::usage("operation buffering is not enabled"));
        }
        self.flush_pending()
    }

    /// Discards the pending writes.
    pub fn drop_buffered_operations(&mut self) {
        if !self.buffer.is_empty() {
            warn!(session = %self.id, dropped = self.buffer.len(), "dropping buffered writes");
        }
        self.buffer.clear();
    }

    /// Number of buffered writes.
    #[must_use]
    pub fn buffered_operations(&self) -> usize {
        self.buffer.len()
    }

    /// Runs a select to completion, following every page.
    ///
    /// Rows come back as values in the descriptor's column order; columns
    /// that were not targeted are null.
    pub fn fetch_all(&mut self, op: PgOp, desc: &TableDesc) -> GateResult<Vec<Vec<SqlValue>>> {
        let PgOp::Read(mut read) = op else {
            return Err(GateError::usage("fetch_all needs a select"));
        };
        let mut rows = Vec::new();
        loop {
            let future = self
                .run_op(PgOp::Read(read.clone()), desc, true)?
                .ok_or_else(|| GateError::internal("a select was buffered"))?;
            let response = self.wait_op(future)?.into_response();
            for record in &response.rows {
                rows.push(
                    desc.columns()
                        .iter()
                        .map(|column| SqlValue::from_field_value(record.field_by_name(&column.name)))
                        .collect(),
                );
            }
            match response.paging_state {
                Some(state) => read.request.paging_state = Some(state),
                None => return Ok(rows),
            }
        }
    }

    /// Next statement id; ids are never reused within a session.
    pub fn next_statement_id(&mut self) -> StatementId {
        let id = StatementId::new(self.next_statement_id);
        self.next_statement_id += 1;
        id
    }

    /// A fresh random row id for tables without a user key.
    #[must_use]
    pub fn generate_new_rowid(&self) -> Bytes {
        Bytes::copy_from_slice(uuid::Uuid::new_v4().as_bytes())
    }

    /// Encodes the key of a row from its key column values.
    pub fn get_row_id(&self, desc: &TableDesc, key_values: &[SqlValue]) -> GateResult<Bytes> {
        self.adapter.get_row_id(desc, key_values)
    }

    // =========================================================================
    // Foreign-Key Cache
    // =========================================================================

    /// Records that a referenced row exists.
    pub fn add_fk_reference(&mut self, table_id: &str, row_id: Bytes) {
        self.fk_cache.insert(table_id, row_id);
    }

    /// Forgets a referenced row.
    pub fn delete_fk_reference(&mut self, table_id: &str, row_id: &Bytes) {
        self.fk_cache.remove(table_id, row_id);
    }

    /// Returns true if the referenced row exists, reading it on a cache miss.
    pub fn fk_reference_exists(&mut self, desc: &TableDesc, row_id: Bytes) -> GateResult<bool> {
        if self.fk_cache.contains(desc.table_id(), &row_id) {
            return Ok(true);
        }
        let mut select = DmlSelectBuilder::new(desc);
        select.bind_row_id(row_id.clone());
        let future = self
            .run_op(select.build(), desc, true)?
            .ok_or_else(|| GateError::internal("a select was buffered"))?;
        let exists = !self.wait_op(future)?.response().rows.is_empty();
        if exists {
            self.fk_cache.insert(desc.table_id(), row_id);
        }
        Ok(exists)
    }

    /// Forgets every referenced row.
    pub fn clear_fk_references(&mut self) {
        self.fk_cache.clear();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("connected", &self.connected.as_ref().map(|ns| &ns.namespace_name))
            .field("txn", &self.txn.state())
            .field("buffered", &self.buffer.len())
            .field("cached_tables", &self.tables.len())
            .finish_non_exhaustive()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.txn.is_active() {
            if let Err(e) = self.abort_transaction() {
                warn!(session = %self.id, error = %e, "abort on close failed");
            }
        }
    }
}
