//! Asynchronous storage client interfaces.
//!
//! The gate talks to the substrate only through these traits. Every call
//! resolves to a status plus an optional payload; it never panics on a
//! substrate-side failure.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::dto::{CollectionCreateRequest, Key, Query, Schema, SkvRecord, SkvStatus};

/// Status plus optional payload.
#[derive(Debug, Clone)]
pub struct SkvResponse<T> {
    /// Outcome of the call.
    pub status: SkvStatus,
    /// Payload, present on success.
    pub value: Option<T>,
}

impl<T> SkvResponse<T> {
    /// A 200 response carrying a value.
    pub fn ok(value: T) -> Self {
        Self { status: SkvStatus::ok(), value: Some(value) }
    }

    /// A response without a payload.
    pub fn status(status: SkvStatus) -> Self {
        Self { status, value: None }
    }

    /// Converts into a `Result`, treating a missing payload as an error.
    pub fn into_result(self) -> Result<T, SkvStatus> {
        match self.value {
            Some(v) if self.status.is_2xx() => Ok(v),
            _ if self.status.is_2xx() => {
                Err(SkvStatus::internal_error("successful response without payload"))
            }
            _ => Err(self.status),
        }
    }
}

/// One page of a scan, with the query advanced past it.
#[derive(Debug, Clone)]
pub struct ScanPage {
    /// Query carrying the new continuation.
    pub query: Query,
    /// Rows in scan order.
    pub records: Vec<SkvRecord>,
}

/// Options for starting a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnOptions {
    /// Time after which every operation of the transaction fails with 408.
    pub timeout: Duration,
}

impl Default for TxnOptions {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(10) }
    }
}

/// Entry point to the substrate.
#[async_trait]
pub trait SkvClient: Send + Sync + 'static {
    /// Creates a collection.
    async fn create_collection(&self, request: CollectionCreateRequest) -> SkvStatus;

    /// Fetches a schema; `None` fetches the latest version.
    async fn get_schema(
        &self,
        collection: &str,
        schema_name: &str,
        version: Option<u32>,
    ) -> SkvResponse<Arc<Schema>>;

    /// Creates a schema version.
    async fn create_schema(&self, collection: &str, schema: Schema) -> SkvStatus;

    /// Creates an unbounded scan over the latest version of a schema.
    async fn create_scan_read(&self, collection: &str, schema_name: &str) -> SkvResponse<Query>;

    /// Starts a transaction.
    async fn begin_txn(&self, options: TxnOptions) -> SkvResponse<Arc<dyn SkvTxn>>;
}

/// A live substrate transaction.
#[async_trait]
pub trait SkvTxn: Send + Sync + fmt::Debug {
    /// Reads the record whose key fields are set in `record`.
    async fn read(&self, record: SkvRecord) -> SkvResponse<SkvRecord>;

    /// Reads a record by encoded key.
    async fn read_key(&self, collection: &str, key: Key) -> SkvResponse<SkvRecord>;

    /// Writes a full record, or erases it when `erase` is set.
    ///
    /// With `reject_if_exists`, an existing row fails the write with 412.
    async fn write(&self, record: SkvRecord, erase: bool, reject_if_exists: bool) -> SkvStatus;

    /// Overwrites only the listed field positions of an existing record.
    ///
    /// `key` identifies the row when the record's own key fields are absent.
    async fn partial_update(
        &self,
        record: SkvRecord,
        fields: Vec<usize>,
        key: Option<Key>,
    ) -> SkvStatus;

    /// Reads the next page of a query.
    async fn scan_read(&self, query: Query) -> SkvResponse<ScanPage>;

    /// Commits or aborts.
    async fn end(&self, commit: bool) -> SkvStatus;
}
