//! System-wide constants for pgskv.
//!
//! The sys catalog schema names and version are part of the persisted
//! layout: changing any of them orphans existing catalogs.

// =============================================================================
// Sys Catalog
// =============================================================================

/// Version every sys catalog schema is created at.
///
/// Bootstrap checks for exactly this version; there is one per deployment.
pub const SYS_SCHEMA_VERSION: u32 = 1;

/// Schema holding one table-head record per table or index.
pub const SYS_TABLE_HEAD_SCHEMA: &str = "K2RESVD_SCHEMA_SQL_TABLE_HEAD";

/// Schema holding one record per table column.
pub const SYS_TABLE_COLUMN_SCHEMA: &str = "K2RESVD_SCHEMA_SQL_TABLE_COLUMN_META";

/// Schema holding one record per index column.
pub const SYS_INDEX_COLUMN_SCHEMA: &str = "K2RESVD_SCHEMA_SQL_INDEX_COLUMN_META";

/// Collection holding the catalogs shared by every database.
pub const PRIMARY_CLUSTER_COLLECTION: &str = "K2RESVD_COLLECTION_SQL_PRIMARY_CLUSTER";

/// Database oid used for the primary cluster namespace.
pub const PRIMARY_CLUSTER_DATABASE_OID: u32 = 0;

// =============================================================================
// Records
// =============================================================================

/// Number of implicit key fields preceding user columns in a data record.
///
/// Tables and indexes live in their own schemas, so data records carry no
/// implicit prefix and column positions map straight onto field positions.
pub const SKV_FIELD_OFFSET: usize = 0;

/// Length in bytes of a generated row id.
pub const ROW_ID_LEN: usize = 16;

// =============================================================================
// Timeouts and Limits
// =============================================================================

/// Default per-transaction deadline in milliseconds.
pub const DEFAULT_TXN_TIMEOUT_MS: u64 = 10_000;

/// Default number of adapter worker threads.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Default bound on operations dispatched concurrently by the adapter.
pub const DEFAULT_MAX_IN_FLIGHT_OPS: usize = 256;

/// Default collection retention (90 days).
pub const DEFAULT_RETENTION_SECS: u64 = 90 * 24 * 60 * 60;

/// First column id handed out to a new table.
pub const FIRST_COLUMN_ID: i32 = 0;

/// First statement id handed out by a session.
pub const FIRST_STATEMENT_ID: u64 = 1;
