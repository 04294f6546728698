//! Async execution bridge.
//!
//! Callers on ordinary threads hand storage requests to a dedicated executor
//! thread and get back a [`Pending`] result:
//!
//! ```text
//!  caller threads                       executor thread
//! ┌──────────────┐   enqueue + notify  ┌──────────────────────────────┐
//! │ SkvBridge::* │────────────────────▶│ swap out all ten queues      │
//! └──────────────┘                     │ drive every request at once  │
//!        ▲                             │ live txn table (owned here)  │
//!        │       oneshot completion    └──────────────┬───────────────┘
//!        └────────────────────────────────────────────┘
//! ```
//!
//! The queue lock is only held to push or to swap; it is never held while a
//! request is in flight. Every request completes exactly once, including
//! requests for unknown transactions (405, tagged invalid) and requests still
//! queued at shutdown (503). A transaction the substrate times out or ends
//! leaves the live table, so later requests on it are unknown.

mod executor;
mod pending;
mod queue;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use pgskv_common::{GateError, GateResult, TxnId};
use pgskv_store::{
    CollectionCreateRequest, Key, Query, ScanPage, Schema, SkvClient, SkvRecord, SkvResponse,
    SkvStatus, TxnOptions,
};
use tracing::info;

use executor::Shared;
use queue::{
    BeginTxnRequest, CollectionCreate, EndTxnRequest, PartialUpdateRequest, Queues, ReadRequest,
    ReadTarget, Reply, ScanCreateRequest, ScanReadRequest, SchemaCreateRequest, SchemaGetRequest,
    WriteRequest,
};

pub(crate) use pending::channel;
pub use pending::{FromStatus, Pending};

/// Counters describing bridge traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Requests accepted into a queue.
    pub submitted: u64,
    /// Requests completed by the executor.
    pub completed: u64,
    /// Scheduling turns run.
    pub turns: u64,
    /// Transactions currently live.
    pub live_txns: u64,
}

/// Handle to the executor thread.
pub struct SkvBridge {
    shared: Arc<Shared>,
    executor: Mutex<Option<JoinHandle<()>>>,
}

impl SkvBridge {
    /// Starts the executor thread over `client`.
    pub fn start(client: Arc<dyn SkvClient>) -> GateResult<Self> {
        let shared = Arc::new(Shared::default());
        let executor = std::thread::Builder::new()
            .name("pgskv-bridge".into())
            .spawn({
                let shared = Arc::clone(&shared);
                move || executor::run(shared, client)
            })
            .map_err(|e| GateError::internal(format!("failed to start bridge executor: {e}")))?;
        info!("bridge started");
        Ok(Self { shared, executor: Mutex::new(Some(executor)) })
    }

    fn submit<T: FromStatus>(&self, push: impl FnOnce(&mut Queues, Reply<T>)) -> Pending<T> {
        let (reply, pending) = pending::channel();
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                drop(state);
                let _ = reply.send(T::from_status(SkvStatus::service_unavailable(
                    "bridge is shut down",
                )));
                return pending;
            }
            push(&mut state.queues, reply);
        }
        self.shared.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.notify.notify_one();
        pending
    }

    /// Starts a transaction.
    pub fn begin_txn(&self, options: TxnOptions) -> Pending<SkvResponse<TxnId>> {
        self.submit(|q, reply| q.begin_txn.push_back(BeginTxnRequest { options, reply }))
    }

    /// Commits or aborts a transaction.
    pub fn end_txn(&self, txn: TxnId, commit: bool) -> Pending<SkvStatus> {
        self.submit(|q, reply| q.end_txn.push_back(EndTxnRequest { txn, commit, reply }))
    }

    /// Fetches a schema; `None` fetches the latest version.
    pub fn get_schema(
        &self,
        collection: &str,
        schema_name: &str,
        version: Option<u32>,
    ) -> Pending<SkvResponse<Arc<Schema>>> {
        let (collection, schema_name) = (collection.to_string(), schema_name.to_string());
        self.submit(|q, reply| {
            q.schema_get.push_back(SchemaGetRequest { collection, schema_name, version, reply });
        })
    }

    /// Creates a schema version.
    pub fn create_schema(&self, collection: &str, schema: Schema) -> Pending<SkvStatus> {
        let collection = collection.to_string();
        self.submit(|q, reply| {
            q.schema_create.push_back(SchemaCreateRequest { collection, schema, reply });
        })
    }

    /// Creates a collection.
    pub fn create_collection(&self, request: CollectionCreateRequest) -> Pending<SkvStatus> {
        self.submit(|q, reply| q.collection_create.push_back(CollectionCreate { request, reply }))
    }

    /// Creates an unbounded scan over the latest schema version.
    pub fn create_scan_read(&self, collection: &str, schema_name: &str) -> Pending<SkvResponse<Query>> {
        let (collection, schema_name) = (collection.to_string(), schema_name.to_string());
        self.submit(|q, reply| {
            q.scan_create.push_back(ScanCreateRequest { collection, schema_name, reply });
        })
    }

    /// Reads the next page of `query`.
    pub fn scan_read(&self, txn: TxnId, query: Query) -> Pending<SkvResponse<ScanPage>> {
        self.submit(|q, reply| q.scan_read.push_back(ScanReadRequest { txn, query, reply }))
    }

    /// Reads the record whose key fields are set in `record`.
    pub fn read(&self, txn: TxnId, record: SkvRecord) -> Pending<SkvResponse<SkvRecord>> {
        let target = ReadTarget::Record(record);
        self.submit(|q, reply| q.read.push_back(ReadRequest { txn, target, reply }))
    }

    /// Reads a record by encoded key.
    pub fn read_key(
        &self,
        txn: TxnId,
        collection: &str,
        key: Key,
    ) -> Pending<SkvResponse<SkvRecord>> {
        let target = ReadTarget::Key { collection: collection.to_string(), key };
        self.submit(|q, reply| q.read.push_back(ReadRequest { txn, target, reply }))
    }

    /// Writes or erases a full record.
    pub fn write(
        &self,
        txn: TxnId,
        record: SkvRecord,
        erase: bool,
        reject_if_exists: bool,
    ) -> Pending<SkvStatus> {
        self.submit(|q, reply| {
            q.write.push_back(WriteRequest { txn, record, erase, reject_if_exists, reply });
        })
    }

    /// Overwrites the listed fields of an existing record.
    pub fn partial_update(
        &self,
        txn: TxnId,
        record: SkvRecord,
        fields: Vec<usize>,
        key: Option<Key>,
    ) -> Pending<SkvStatus> {
        self.submit(|q, reply| {
            q.partial_update.push_back(PartialUpdateRequest { txn, record, fields, key, reply });
        })
    }

    /// Current counters.
    #[must_use]
    pub fn stats(&self) -> BridgeStats {
        BridgeStats {
            submitted: self.shared.submitted.load(Ordering::Relaxed),
            completed: self.shared.completed.load(Ordering::Relaxed),
            turns: self.shared.turns.load(Ordering::Relaxed),
            live_txns: self.shared.live_txns.load(Ordering::Relaxed),
        }
    }

    /// Stops accepting requests and waits for the executor to exit.
    ///
    /// Requests still queued complete with 503 and live transactions are
    /// aborted.
    pub fn shutdown(&self) {
        self.shared.state.lock().closed = true;
        self.shared.notify.notify_one();
        if let Some(handle) = self.executor.lock().take() {
            if handle.join().is_err() {
                tracing::error!("bridge executor panicked");
            }
            info!("bridge stopped");
        }
    }
}

impl Drop for SkvBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for SkvBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkvBridge").field("stats", &self.stats()).finish()
    }
}
