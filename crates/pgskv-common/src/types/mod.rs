//! Core types for pgskv.

mod ids;

pub use ids::{namespace_id, PgObjectId, PgOid, StatementId, TxnId};
