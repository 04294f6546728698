//! Secondary indexes and their build permissions.
//!
//! An index being built online walks through the permission states in
//! increasing order:
//!
//! ```text
//! DeleteOnly ──▶ WriteAndDelete ──▶ DoBackfill ──▶ ReadWriteAndDelete
//!                                                          │
//!         IndexUnused ◀── DeleteOnlyWhileRemoving ◀── WriteAndDeleteWhileRemoving
//! ```
//!
//! Transitions only ever move forward. Which step is taken next, and when,
//! is decided by an [`IndexPermissionPolicy`].

use std::fmt;

use pgskv_common::{GateError, GateResult, PgOid};

use super::{DataType, SortingType};

/// Build state of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i16)]
pub enum IndexPermissions {
    /// Only deletes are applied to the index.
    DeleteOnly = 0,
    /// Writes and deletes are applied; reads are not served.
    WriteAndDelete = 2,
    /// Existing rows are being copied into the index.
    DoBackfill = 4,
    /// Fully usable.
    ReadWriteAndDelete = 6,
    /// Being dropped; writes and deletes still applied.
    WriteAndDeleteWhileRemoving = 8,
    /// Being dropped; only deletes applied.
    DeleteOnlyWhileRemoving = 10,
    /// Dropped and no longer maintained.
    IndexUnused = 12,
}

impl IndexPermissions {
    /// Persisted integer id.
    #[inline]
    #[must_use]
    pub const fn id(self) -> i16 {
        self as i16
    }

    /// Looks a permission up by its persisted id.
    pub fn from_id(id: i16) -> GateResult<Self> {
        match id {
            0 => Ok(Self::DeleteOnly),
            2 => Ok(Self::WriteAndDelete),
            4 => Ok(Self::DoBackfill),
            6 => Ok(Self::ReadWriteAndDelete),
            8 => Ok(Self::WriteAndDeleteWhileRemoving),
            10 => Ok(Self::DeleteOnlyWhileRemoving),
            12 => Ok(Self::IndexUnused),
            _ => Err(GateError::corruption(format!("unknown index permission {id}"))),
        }
    }

    /// Returns true if the index can serve reads.
    #[inline]
    #[must_use]
    pub fn is_readable(self) -> bool {
        self == Self::ReadWriteAndDelete
    }

    /// Returns true if moving to `next` keeps transitions monotonic.
    #[inline]
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        next > self
    }
}

impl fmt::Display for IndexPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DeleteOnly => "DELETE_ONLY",
            Self::WriteAndDelete => "WRITE_AND_DELETE",
            Self::DoBackfill => "DO_BACKFILL",
            Self::ReadWriteAndDelete => "READ_WRITE_AND_DELETE",
            Self::WriteAndDeleteWhileRemoving => "WRITE_AND_DELETE_WHILE_REMOVING",
            Self::DeleteOnlyWhileRemoving => "DELETE_ONLY_WHILE_REMOVING",
            Self::IndexUnused => "INDEX_UNUSED",
        };
        f.write_str(name)
    }
}

/// Decides the next permission step of an index build.
pub trait IndexPermissionPolicy: Send + Sync + fmt::Debug {
    /// Next state for `index`, or `None` if it should stay where it is.
    ///
    /// A returned state must be greater than the current one.
    fn next(&self, index: &IndexInfo) -> Option<IndexPermissions>;
}

/// Advances a building index one state at a time until it is readable.
///
/// Backfill is treated as instantaneous: the state after `DoBackfill` is
/// `ReadWriteAndDelete`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepwiseBackfillPolicy;

impl IndexPermissionPolicy for StepwiseBackfillPolicy {
    fn next(&self, index: &IndexInfo) -> Option<IndexPermissions> {
        match index.index_permissions {
            IndexPermissions::DeleteOnly => Some(IndexPermissions::WriteAndDelete),
            IndexPermissions::WriteAndDelete => Some(IndexPermissions::DoBackfill),
            IndexPermissions::DoBackfill => Some(IndexPermissions::ReadWriteAndDelete),
            _ => None,
        }
    }
}

/// One column of an index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    /// Column id within the index.
    pub column_id: i32,
    /// Column name within the index.
    pub column_name: String,
    /// Relational type, equal to the base column type.
    pub data_type: DataType,
    /// Whether the column accepts nulls.
    pub is_nullable: bool,
    /// Part of the hash portion of the index key.
    pub is_partition: bool,
    /// Attribute number within the index.
    pub order: i32,
    /// Sort order.
    pub sorting_type: SortingType,
    /// Id of the base-table column this column indexes.
    pub base_column_id: i32,
}

/// A secondary index over a base table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    /// Index table id (also the name of its key-value schema).
    pub table_id: String,
    /// Index name.
    pub table_name: String,
    /// Relational object id.
    pub pg_oid: PgOid,
    /// Id of the indexed table.
    pub base_table_id: String,
    /// Schema version.
    pub version: u32,
    /// Unique index.
    pub is_unique: bool,
    /// Index columns in key order.
    pub columns: Vec<IndexColumn>,
    /// Build state.
    pub index_permissions: IndexPermissions,
}

impl IndexInfo {
    /// Creates an index at version 1 in the `DeleteOnly` state.
    pub fn new(
        table_id: impl Into<String>,
        table_name: impl Into<String>,
        pg_oid: PgOid,
        base_table_id: impl Into<String>,
        is_unique: bool,
        columns: Vec<IndexColumn>,
    ) -> Self {
        Self {
            table_id: table_id.into(),
            table_name: table_name.into(),
            pg_oid,
            base_table_id: base_table_id.into(),
            version: 1,
            is_unique,
            columns,
            index_permissions: IndexPermissions::DeleteOnly,
        }
    }

    /// Sets the build state.
    #[must_use]
    pub fn with_permissions(mut self, permissions: IndexPermissions) -> Self {
        self.index_permissions = permissions;
        self
    }

    /// Moves to `next`, refusing backward or repeated transitions.
    pub fn transition_to(&mut self, next: IndexPermissions) -> GateResult<()> {
        if !self.index_permissions.can_transition_to(next) {
            return Err(GateError::invalid_argument(format!(
                "index {} cannot move from {} to {}",
                self.table_id, self.index_permissions, next
            )));
        }
        self.index_permissions = next;
        Ok(())
    }

    /// Number of columns that form the hash portion of the key.
    #[must_use]
    pub fn num_hash_key_columns(&self) -> usize {
        self.columns.iter().filter(|c| c.is_partition).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index() -> IndexInfo {
        IndexInfo::new("idx", "tag_idx", 16400, "base", true, Vec::new())
    }

    #[test]
    fn test_permission_ids() {
        assert_eq!(IndexPermissions::ReadWriteAndDelete.id(), 6);
        assert_eq!(IndexPermissions::from_id(12).unwrap(), IndexPermissions::IndexUnused);
        assert!(IndexPermissions::from_id(3).is_err());
    }

    #[test]
    fn test_transitions_are_monotonic() {
        let mut index = index();
        index.transition_to(IndexPermissions::DoBackfill).unwrap();
        assert!(index.transition_to(IndexPermissions::WriteAndDelete).is_err());
        assert!(index.transition_to(IndexPermissions::DoBackfill).is_err());
        assert_eq!(index.index_permissions, IndexPermissions::DoBackfill);
    }

    #[test]
    fn test_stepwise_policy_stops_when_readable() {
        let policy = StepwiseBackfillPolicy;
        let mut index = index();
        let mut steps = Vec::new();
        while let Some(next) = policy.next(&index) {
            index.transition_to(next).unwrap();
            steps.push(next);
        }
        assert_eq!(
            steps,
            vec![
                IndexPermissions::WriteAndDelete,
                IndexPermissions::DoBackfill,
                IndexPermissions::ReadWriteAndDelete,
            ]
        );
        assert!(index.index_permissions.is_readable());
    }
}
