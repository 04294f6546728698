//! Write buffering and the foreign-key existence cache.

use std::collections::HashSet;

use bytes::Bytes;
use pgskv_common::{GateError, GateResult};

use crate::adapter::{PgOp, SqlOpExpr};

/// Writes held back until the next flush.
///
/// The buffer is either disabled or enabled; an enabled buffer may be empty
/// or hold pending writes, which are flushed in insertion order.
#[derive(Debug, Default)]
pub enum WriteBuffer {
    /// Writes run immediately.
    #[default]
    Disabled,
    /// Writes accumulate here.
    Enabled(Vec<PgOp>),
}

impl WriteBuffer {
    /// Returns true while buffering.
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Number of pending writes.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Disabled => 0,
            Self::Enabled(ops) => ops.len(),
        }
    }

    /// Returns true if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts buffering; fails if already buffering.
    pub fn enable(&mut self) -> GateResult<()> {
        if self.is_enabled() {
            return Err(GateError::usage("operation buffering is already enabled"));
        }
        *self = Self::Enabled(Vec::new());
        Ok(())
    }

    /// Stops buffering and returns the pending writes.
    pub fn disable(&mut self) -> GateResult<Vec<PgOp>> {
        match std::mem::take(self) {
            Self::Disabled => Err(GateError::usage("operation buffering is not enabled")),
            Self::Enabled(ops) => Ok(ops),
        }
    }

    /// Takes the pending writes and keeps buffering.
    pub fn take(&mut self) -> GateResult<Vec<PgOp>> {
        match self {
            Self::Disabled => Err(GateError::usage("operation buffering is not enabled")),
            Self::Enabled(ops) => Ok(std::mem::take(ops)),
        }
    }

    /// Discards the pending writes.
    pub fn clear(&mut self) {
        if let Self::Enabled(ops) = self {
            ops.clear();
        }
    }

    /// Appends a write; the buffer must be enabled.
    pub fn push(&mut self, op: PgOp) -> GateResult<()> {
        match self {
            Self::Disabled => Err(GateError::usage("operation buffering is not enabled")),
            Self::Enabled(ops) => {
                ops.push(op);
                Ok(())
            }
        }
    }

    /// Returns true if a pending write targets the same row as `op`.
    #[must_use]
    pub fn touches_same_row(&self, op: &PgOp) -> bool {
        let Self::Enabled(ops) = self else {
            return false;
        };
        let Some(key) = RowKey::of(op) else {
            return false;
        };
        ops.iter().any(|pending| RowKey::of(pending).as_ref() == Some(&key))
    }
}

/// Identity of the row a write targets.
#[derive(Debug, PartialEq)]
enum RowKey<'a> {
    RowId(&'a str, &'a Bytes),
    Values(&'a str, &'a [SqlOpExpr]),
}

impl<'a> RowKey<'a> {
    fn of(op: &'a PgOp) -> Option<Self> {
        let PgOp::Write(write) = op else {
            return None;
        };
        let request = &write.request;
        match &request.row_id {
            Some(row_id) => Some(Self::RowId(&request.table_id, row_id)),
            None => Some(Self::Values(&request.table_id, &request.key_column_values)),
        }
    }
}

/// Rows known to exist, as (table id, row id) pairs.
///
/// Entries are added and removed explicitly by the write path and dropped
/// wholesale on demand.
#[derive(Debug, Default)]
pub struct FkCache {
    rows: HashSet<(String, Bytes)>,
}

impl FkCache {
    /// Records that a row exists.
    pub fn insert(&mut self, table_id: &str, row_id: Bytes) {
        self.rows.insert((table_id.to_string(), row_id));
    }

    /// Forgets a row.
    pub fn remove(&mut self, table_id: &str, row_id: &Bytes) -> bool {
        self.rows.remove(&(table_id.to_string(), row_id.clone()))
    }

    /// Returns true if the row is cached as existing.
    #[must_use]
    pub fn contains(&self, table_id: &str, row_id: &Bytes) -> bool {
        self.rows.contains(&(table_id.to_string(), row_id.clone()))
    }

    /// Number of cached rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Forgets every row.
    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
