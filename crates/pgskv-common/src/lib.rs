//! # pgskv-common
//!
//! Common types, errors, and configuration for pgskv.
//!
//! This crate provides the foundational pieces shared by the storage client
//! and the gate:
//!
//! - **Types**: identifiers (`TxnId`, `StatementId`, `PgOid`, `PgObjectId`)
//! - **Errors**: the relational-facing error taxonomy with `GateError`
//! - **Config**: `GateConfig` loaded from TOML
//! - **Constants**: system schema names and bootstrap versions
//!
//! ## Example
//!
//! ```rust
//! use pgskv_common::types::PgObjectId;
//! use pgskv_common::error::GateResult;
//!
//! fn example() -> GateResult<()> {
//!     let table = PgObjectId::new(16384, 16390);
//!     assert_eq!(table.database_oid(), 16384);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;
pub mod types;

// Re-export commonly used items at the crate root
pub use config::GateConfig;
pub use constants::*;
pub use error::{ErrorCode, GateError, GateResult, RequestStatus};
pub use types::{PgObjectId, PgOid, StatementId, TxnId};
