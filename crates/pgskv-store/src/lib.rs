//! # pgskv-store
//!
//! The storage-substrate surface consumed by the gate.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         SkvClient                                │
//! │   create_collection · get_schema · create_schema · begin_txn    │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                          SkvTxn                                  │
//! │   read · read_key · write · partial_update · scan_read · end    │
//! ├──────────────────────────────┬──────────────────────────────────┤
//! │   dto: Schema, SkvRecord,    │   memory: MemoryStore            │
//! │   Key, Query, SkvStatus      │   (snapshot MVCC, in-process)    │
//! └──────────────────────────────┴──────────────────────────────────┘
//! ```
//!
//! Every call returns a status code plus an optional payload. Codes follow
//! HTTP conventions (200, 404, 409, ...); the gate translates them into its
//! own error taxonomy.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod dto;
pub mod error;
pub mod memory;

pub use client::{ScanPage, SkvClient, SkvResponse, SkvTxn, TxnOptions};
pub use dto::{
    CollectionCapacity, CollectionCreateRequest, CollectionMetadata, Decimal64, FieldType,
    FieldValue, Filter, FromFieldValue, HashScheme, Key, Query, Schema, SchemaField, SkvRecord,
    SkvStatus, StorageDriver,
};
pub use error::{SkvError, SkvResult};
pub use memory::MemoryStore;
