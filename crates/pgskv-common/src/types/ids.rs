//! Core identifier types for pgskv.
//!
//! These types provide type-safe wrappers around numeric identifiers,
//! preventing accidental misuse of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Object identifier assigned by the relational engine.
pub type PgOid = u32;

/// Fixed middle segment of a table id string.
const TABLE_ID_INFIX: &str = "0000300080000000";

/// Fixed tail of a namespace id string.
const NAMESPACE_ID_SUFFIX: &str = "000030000000000000000000";

/// Transaction identifier - names a live transaction in the executor.
///
/// Ids are handed out by the storage-facing executor and are never
/// reused while the executor runs.
///
/// # Example
///
/// ```rust
/// use pgskv_common::types::TxnId;
///
/// let txn = TxnId::new(1);
/// assert!(txn.is_valid());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct TxnId(u64);

impl TxnId {
    /// Invalid transaction ID, used as a sentinel value.
    pub const INVALID: Self = Self(0);

    /// Minimum valid transaction ID.
    pub const MIN: Self = Self(1);

    /// Creates a new `TxnId` from a raw u64 value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Checks if this is a valid transaction ID.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Debug for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "TxnId(INVALID)")
        } else {
            write!(f, "TxnId({})", self.0)
        }
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TxnId {
    #[inline]
    fn from(id: u64) -> Self {
        Self::new(id)
    }
}

/// Statement identifier, unique for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(transparent)]
pub struct StatementId(u64);

impl StatementId {
    /// Creates a new `StatementId`.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw u64 value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StatementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Relational object id: the pair (database oid, object oid).
///
/// Its string forms are the namespace id (collection name) and the table
/// id (schema name) used on the storage side.
///
/// # Example
///
/// ```rust
/// use pgskv_common::types::PgObjectId;
///
/// let id = PgObjectId::new(0x4000, 0x4010);
/// let parsed = PgObjectId::from_table_id(&id.table_id()).unwrap();
/// assert_eq!(parsed, id);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PgObjectId {
    database_oid: PgOid,
    object_oid: PgOid,
}

impl PgObjectId {
    /// Creates a new object id.
    #[inline]
    #[must_use]
    pub const fn new(database_oid: PgOid, object_oid: PgOid) -> Self {
        Self { database_oid, object_oid }
    }

    /// Returns the database oid.
    #[inline]
    #[must_use]
    pub const fn database_oid(&self) -> PgOid {
        self.database_oid
    }

    /// Returns the object oid.
    #[inline]
    #[must_use]
    pub const fn object_oid(&self) -> PgOid {
        self.object_oid
    }

    /// Returns the 32-character table id string.
    #[must_use]
    pub fn table_id(&self) -> String {
        format!("{:08x}{TABLE_ID_INFIX}{:08x}", self.database_oid, self.object_oid)
    }

    /// Returns the 32-character namespace id string of the owning database.
    #[must_use]
    pub fn namespace_id(&self) -> String {
        namespace_id(self.database_oid)
    }

    /// Parses a table id string produced by [`PgObjectId::table_id`].
    #[must_use]
    pub fn from_table_id(table_id: &str) -> Option<Self> {
        if table_id.len() != 32 || !table_id.is_ascii() || &table_id[8..24] != TABLE_ID_INFIX {
            return None;
        }
        let database_oid = u32::from_str_radix(&table_id[..8], 16).ok()?;
        let object_oid = u32::from_str_radix(&table_id[24..], 16).ok()?;
        Some(Self::new(database_oid, object_oid))
    }
}

impl fmt::Display for PgObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database_oid, self.object_oid)
    }
}

/// Returns the namespace id string for a database oid.
#[must_use]
pub fn namespace_id(database_oid: PgOid) -> String {
    format!("{database_oid:08x}{NAMESPACE_ID_SUFFIX}")
}
