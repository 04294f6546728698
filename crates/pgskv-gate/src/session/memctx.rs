//! Per-connection memory contexts.
//!
//! A context is an arena of prepared statements and table descriptors the
//! relational engine refers to by integer handle. Resetting a context frees
//! its slots; destroying it also frees the context handle.

use std::collections::HashMap;
use std::sync::Arc;

use pgskv_common::{GateError, GateResult};

use crate::adapter::PgOp;
use crate::entity::TableDesc;

/// Handle of a context or of a slot within one.
pub type Handle = u64;

/// One arena.
#[derive(Debug, Default)]
pub struct MemoryContext {
    statements: HashMap<Handle, PgOp>,
    descs: HashMap<Handle, Arc<TableDesc>>,
    next_slot: Handle,
}

impl MemoryContext {
    fn next_slot(&mut self) -> Handle {
        self.next_slot += 1;
        self.next_slot
    }

    /// Stores a prepared statement and returns its handle.
    pub fn alloc_statement(&mut self, op: PgOp) -> Handle {
        let handle = self.next_slot();
        self.statements.insert(handle, op);
        handle
    }

    /// Stores a table descriptor and returns its handle.
    pub fn alloc_table_desc(&mut self, desc: Arc<TableDesc>) -> Handle {
        let handle = self.next_slot();
        self.descs.insert(handle, desc);
        handle
    }

    /// A prepared statement.
    pub fn statement(&self, handle: Handle) -> GateResult<&PgOp> {
        self.statements
            .get(&handle)
            .ok_or_else(|| GateError::invalid_argument(format!("unknown statement handle {handle}")))
    }

    /// A table descriptor.
    pub fn table_desc(&self, handle: Handle) -> GateResult<&Arc<TableDesc>> {
        self.descs
            .get(&handle)
            .ok_or_else(|| GateError::invalid_argument(format!("unknown table handle {handle}")))
    }

    /// Frees one statement slot.
    pub fn free_statement(&mut self, handle: Handle) -> Option<PgOp> {
        self.statements.remove(&handle)
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.statements.len() + self.descs.len()
    }

    /// Returns true if no slot is occupied.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn reset(&mut self) {
        self.statements.clear();
        self.descs.clear();
    }
}

/// Contexts of one connection.
#[derive(Debug, Default)]
pub struct MemoryContextRegistry {
    contexts: HashMap<Handle, MemoryContext>,
    next_handle: Handle,
}

impl MemoryContextRegistry {
    /// Creates an empty context.
    pub fn create(&mut self) -> Handle {
        self.next_handle += 1;
        self.contexts.insert(self.next_handle, MemoryContext::default());
        self.next_handle
    }

    /// A live context.
    pub fn get(&self, handle: Handle) -> GateResult<&MemoryContext> {
        self.contexts
            .get(&handle)
            .ok_or_else(|| GateError::invalid_argument(format!("unknown memory context {handle}")))
    }

    /// A live context, mutably.
    pub fn get_mut(&mut self, handle: Handle) -> GateResult<&mut MemoryContext> {
        self.contexts
            .get_mut(&handle)
            .ok_or_else(|| GateError::invalid_argument(format!("unknown memory context {handle}")))
    }

    /// Frees every slot of a context; the context stays usable.
    pub fn reset(&mut self, handle: Handle) -> GateResult<()> {
        self.get_mut(handle)?.reset();
        Ok(())
    }

    /// Frees a context and its slots.
    pub fn destroy(&mut self, handle: Handle) -> GateResult<()> {
        self.contexts
            .remove(&handle)
            .map(drop)
            .ok_or_else(|| GateError::invalid_argument(format!("unknown memory context {handle}")))
    }

    /// Drops table descriptors from every context.
    ///
    /// Descriptors go stale when the catalog changes; statements stay.
    pub fn clear_table_descs(&mut self) {
        for context in self.contexts.values_mut() {
            context.descs.clear();
        }
    }

    /// Number of live contexts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    /// Returns true if no context is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
