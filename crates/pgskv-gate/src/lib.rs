//! # pgskv-gate
//!
//! Relational gateway over a schema'd transactional key-value store.
//!
//! ```text
//!                 ┌───────────────────────────────┐
//!                 │            Session            │  connection state, txn,
//!                 │  (write buffer · desc cache)  │  buffering, fk cache
//!                 └───────┬───────────────┬───────┘
//!                         │ DDL           │ PgOp
//!                 ┌───────▼───────┐ ┌─────▼─────────┐
//!                 │CatalogManager │ │    Adapter    │  request translation,
//!                 │ handler·codec │─▶  worker pool  │  status mapping
//!                 └───────────────┘ └─────┬─────────┘
//!                   mapper: tables ──▶     │ Pending
//!                   key-value schemas ┌────▼──────────┐
//!                                     │   SkvBridge   │  executor thread,
//!                                     │ (live txns)   │  queued requests
//!                                     └────┬──────────┘
//!                                          ▼
//!                                      SkvClient
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use pgskv_common::GateConfig;
//! use pgskv_gate::Gate;
//!
//! let gate = Gate::open_memory(GateConfig::default())?;
//! let mut session = gate.create_session();
//! session.create_database("app", 16384)?;
//! session.connect_database("app")?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod adapter;
pub mod bridge;
pub mod catalog;
pub mod entity;
pub mod mapper;
pub mod session;

mod gate;

pub use adapter::{Adapter, OpFuture};
pub use bridge::{Pending, SkvBridge};
pub use catalog::{CatalogHandler, CatalogManager};
pub use gate::Gate;
pub use session::{Session, SessionId};
