//! The run-to-completion executor behind the bridge.
//!
//! One thread runs a current-thread runtime. Each scheduling turn swaps out
//! every queue under the lock, releases it, and then drives all drained
//! requests concurrently. The live transaction table belongs to this thread
//! alone.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use pgskv_common::TxnId;
use pgskv_store::{SkvClient, SkvResponse, SkvStatus, SkvTxn};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use super::queue::{
    BeginTxnRequest, CollectionCreate, EndTxnRequest, PartialUpdateRequest, QueueState, Queues,
    ReadRequest, ReadTarget, Reply, ScanCreateRequest, ScanReadRequest, SchemaCreateRequest,
    SchemaGetRequest, WriteRequest,
};

/// State shared between submitters and the executor.
#[derive(Default)]
pub(crate) struct Shared {
    pub state: Mutex<QueueState>,
    pub notify: Notify,
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub turns: AtomicU64,
    pub live_txns: AtomicU64,
}

/// Thread entry point.
pub(crate) fn run(shared: Arc<Shared>, client: Arc<dyn SkvClient>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to build bridge runtime");
            let queued = {
                let mut state = shared.state.lock();
                state.closed = true;
                state.take()
            };
            let failed = queued.fail_all(&SkvStatus::service_unavailable("bridge failed to start"));
            shared.completed.fetch_add(failed as u64, Ordering::Relaxed);
            return;
        }
    };
    let executor = Executor {
        shared,
        client,
        txns: RefCell::new(HashMap::new()),
        next_txn: Cell::new(TxnId::MIN.as_u64()),
    };
    runtime.block_on(executor.run());
}

struct Executor {
    shared: Arc<Shared>,
    client: Arc<dyn SkvClient>,
    txns: RefCell<HashMap<TxnId, Arc<dyn SkvTxn>>>,
    next_txn: Cell<u64>,
}

impl Executor {
    async fn run(&self) {
        debug!("bridge executor running");
        loop {
            let (batch, closed) = {
                let mut state = self.shared.state.lock();
                (state.take(), state.closed)
            };
            if closed {
                let failed =
                    batch.fail_all(&SkvStatus::service_unavailable("bridge is shutting down"));
                self.shared.completed.fetch_add(failed as u64, Ordering::Relaxed);
                if failed > 0 {
                    warn!(failed, "completed queued requests at shutdown");
                }
                break;
            }
            if batch.is_empty() {
                self.shared.notify.notified().await;
                continue;
            }
            self.turn(batch).await;
        }
        self.abort_live_txns().await;
        info!("bridge executor stopped");
    }

    async fn turn(&self, batch: Queues) {
        self.shared.turns.fetch_add(1, Ordering::Relaxed);
        let Queues {
            begin_txn,
            end_txn,
            schema_get,
            schema_create,
            collection_create,
            scan_create,
            scan_read,
            read,
            write,
            partial_update,
        } = batch;

        tokio::join!(
            join_all(begin_txn.into_iter().map(|r| self.begin_txn(r))),
            join_all(end_txn.into_iter().map(|r| self.end_txn(r))),
            join_all(schema_get.into_iter().map(|r| self.schema_get(r))),
            join_all(schema_create.into_iter().map(|r| self.schema_create(r))),
            join_all(collection_create.into_iter().map(|r| self.collection_create(r))),
            join_all(scan_create.into_iter().map(|r| self.scan_create(r))),
            join_all(scan_read.into_iter().map(|r| self.scan_read(r))),
            join_all(read.into_iter().map(|r| self.read(r))),
            join_all(write.into_iter().map(|r| self.write(r))),
            join_all(partial_update.into_iter().map(|r| self.partial_update(r))),
        );
    }

    fn complete<T>(&self, reply: Reply<T>, value: T) {
        self.shared.completed.fetch_add(1, Ordering::Relaxed);
        // the caller may have stopped waiting; the request still counts
        let _ = reply.send(value);
    }

    fn live_txn(&self, id: TxnId) -> Result<Arc<dyn SkvTxn>, SkvStatus> {
        self.txns.borrow().get(&id).cloned().ok_or_else(|| {
            warn!(txn = %id, "request for unknown transaction");
            SkvStatus::invalid_txn(format!("transaction {id} is not live"))
        })
    }

    /// Drops a transaction the substrate already ended, so later requests
    /// on it fail as invalid instead of being retried.
    fn retire_if_ended(&self, id: TxnId, status: &SkvStatus) {
        if !status.ends_txn() || status.invalid_txn {
            return;
        }
        if self.txns.borrow_mut().remove(&id).is_some() {
            self.shared.live_txns.fetch_sub(1, Ordering::Relaxed);
            warn!(txn = %id, %status, "transaction ended by the substrate");
        }
    }

    async fn begin_txn(&self, request: BeginTxnRequest) {
        let response = match self.client.begin_txn(request.options).await.into_result() {
            Ok(txn) => {
                let id = TxnId::new(self.next_txn.get());
                self.next_txn.set(id.as_u64() + 1);
                self.txns.borrow_mut().insert(id, txn);
                self.shared.live_txns.fetch_add(1, Ordering::Relaxed);
                debug!(txn = %id, "transaction started");
                SkvResponse::ok(id)
            }
            Err(status) => {
                error!(%status, "failed to begin transaction");
                SkvResponse::status(status)
            }
        };
        self.complete(request.reply, response);
    }

    async fn end_txn(&self, request: EndTxnRequest) {
        let txn = self.txns.borrow_mut().remove(&request.txn);
        let status = match txn {
            Some(txn) => {
                self.shared.live_txns.fetch_sub(1, Ordering::Relaxed);
                let status = txn.end(request.commit).await;
                debug!(txn = %request.txn, commit = request.commit, %status, "transaction ended");
                status
            }
            None => SkvStatus::invalid_txn(format!("transaction {} is not live", request.txn)),
        };
        self.complete(request.reply, status);
    }

    async fn schema_get(&self, request: SchemaGetRequest) {
        let response = self
            .client
            .get_schema(&request.collection, &request.schema_name, request.version)
            .await;
        self.complete(request.reply, response);
    }

    async fn schema_create(&self, request: SchemaCreateRequest) {
        let status = self.client.create_schema(&request.collection, request.schema).await;
        self.complete(request.reply, status);
    }

    async fn collection_create(&self, request: CollectionCreate) {
        let status = self.client.create_collection(request.request).await;
        self.complete(request.reply, status);
    }

    async fn scan_create(&self, request: ScanCreateRequest) {
        let response =
            self.client.create_scan_read(&request.collection, &request.schema_name).await;
        self.complete(request.reply, response);
    }

    async fn scan_read(&self, request: ScanReadRequest) {
        let response = match self.live_txn(request.txn) {
            Ok(txn) => txn.scan_read(request.query).await,
            Err(status) => SkvResponse::status(status),
        };
        self.retire_if_ended(request.txn, &response.status);
        self.complete(request.reply, response);
    }

    async fn read(&self, request: ReadRequest) {
        let response = match self.live_txn(request.txn) {
            Ok(txn) => match request.target {
                ReadTarget::Record(record) => txn.read(record).await,
                ReadTarget::Key { collection, key } => txn.read_key(&collection, key).await,
            },
            Err(status) => SkvResponse::status(status),
        };
        self.retire_if_ended(request.txn, &response.status);
        self.complete(request.reply, response);
    }

    async fn write(&self, request: WriteRequest) {
        let status = match self.live_txn(request.txn) {
            Ok(txn) => txn.write(request.record, request.erase, request.reject_if_exists).await,
            Err(status) => status,
        };
        self.retire_if_ended(request.txn, &status);
        self.complete(request.reply, status);
    }

    async fn partial_update(&self, request: PartialUpdateRequest) {
        let status = match self.live_txn(request.txn) {
            Ok(txn) => txn.partial_update(request.record, request.fields, request.key).await,
            Err(status) => status,
        };
        self.retire_if_ended(request.txn, &status);
        self.complete(request.reply, status);
    }

    async fn abort_live_txns(&self) {
        let live: Vec<_> = self.txns.borrow_mut().drain().collect();
        for (id, txn) in live {
            let status = txn.end(false).await;
            self.shared.live_txns.fetch_sub(1, Ordering::Relaxed);
            warn!(txn = %id, %status, "aborted live transaction at shutdown");
        }
    }
}
