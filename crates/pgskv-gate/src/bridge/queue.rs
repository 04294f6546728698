//! Typed request queues shared between callers and the executor.

use std::collections::VecDeque;
use std::sync::Arc;

use pgskv_common::TxnId;
use pgskv_store::{
    CollectionCreateRequest, Key, Query, ScanPage, Schema, SkvRecord, SkvResponse, SkvStatus,
    TxnOptions,
};
use tokio::sync::oneshot;

use super::pending::FromStatus;

pub(crate) type Reply<T> = oneshot::Sender<T>;

pub(crate) struct BeginTxnRequest {
    pub options: TxnOptions,
    pub reply: Reply<SkvResponse<TxnId>>,
}

pub(crate) struct EndTxnRequest {
    pub txn: TxnId,
    pub commit: bool,
    pub reply: Reply<SkvStatus>,
}

pub(crate) struct SchemaGetRequest {
    pub collection: String,
    pub schema_name: String,
    pub version: Option<u32>,
    pub reply: Reply<SkvResponse<Arc<Schema>>>,
}

pub(crate) struct SchemaCreateRequest {
    pub collection: String,
    pub schema: Schema,
    pub reply: Reply<SkvStatus>,
}

pub(crate) struct CollectionCreate {
    pub request: CollectionCreateRequest,
    pub reply: Reply<SkvStatus>,
}

pub(crate) struct ScanCreateRequest {
    pub collection: String,
    pub schema_name: String,
    pub reply: Reply<SkvResponse<Query>>,
}

pub(crate) struct ScanReadRequest {
    pub txn: TxnId,
    pub query: Query,
    pub reply: Reply<SkvResponse<ScanPage>>,
}

/// What a point read targets.
pub(crate) enum ReadTarget {
    Record(SkvRecord),
    Key { collection: String, key: Key },
}

pub(crate) struct ReadRequest {
    pub txn: TxnId,
    pub target: ReadTarget,
    pub reply: Reply<SkvResponse<SkvRecord>>,
}

pub(crate) struct WriteRequest {
    pub txn: TxnId,
    pub record: SkvRecord,
    pub erase: bool,
    pub reject_if_exists: bool,
    pub reply: Reply<SkvStatus>,
}

pub(crate) struct PartialUpdateRequest {
    pub txn: TxnId,
    pub record: SkvRecord,
    pub fields: Vec<usize>,
    pub key: Option<Key>,
    pub reply: Reply<SkvStatus>,
}

/// One FIFO per request kind.
#[derive(Default)]
pub(crate) struct Queues {
    pub begin_txn: VecDeque<BeginTxnRequest>,
    pub end_txn: VecDeque<EndTxnRequest>,
    pub schema_get: VecDeque<SchemaGetRequest>,
    pub schema_create: VecDeque<SchemaCreateRequest>,
    pub collection_create: VecDeque<CollectionCreate>,
    pub scan_create: VecDeque<ScanCreateRequest>,
    pub scan_read: VecDeque<ScanReadRequest>,
    pub read: VecDeque<ReadRequest>,
    pub write: VecDeque<WriteRequest>,
    pub partial_update: VecDeque<PartialUpdateRequest>,
}

impl Queues {
    /// Total queued requests.
    pub fn len(&self) -> usize {
        self.begin_txn.len()
            + self.end_txn.len()
            + self.schema_get.len()
            + self.schema_create.len()
            + self.collection_create.len()
            + self.scan_create.len()
            + self.scan_read.len()
            + self.read.len()
            + self.write.len()
            + self.partial_update.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Completes every queued request with `status`.
    pub fn fail_all(self, status: &SkvStatus) -> usize {
        fn fail<T: FromStatus>(reply: Reply<T>, status: &SkvStatus) {
            let _ = reply.send(T::from_status(status.clone()));
        }
        let count = self.len();
        self.begin_txn.into_iter().for_each(|r| fail(r.reply, status));
        self.end_txn.into_iter().for_each(|r| fail(r.reply, status));
        self.schema_get.into_iter().for_each(|r| fail(r.reply, status));
        self.schema_create.into_iter().for_each(|r| fail(r.reply, status));
        self.collection_create.into_iter().for_each(|r| fail(r.reply, status));
        self.scan_create.into_iter().for_each(|r| fail(r.reply, status));
        self.scan_read.into_iter().for_each(|r| fail(r.reply, status));
        self.read.into_iter().for_each(|r| fail(r.reply, status));
        self.write.into_iter().for_each(|r| fail(r.reply, status));
        self.partial_update.into_iter().for_each(|r| fail(r.reply, status));
        count
    }
}

/// Queues plus the closed flag, guarded by one lock.
#[derive(Default)]
pub(crate) struct QueueState {
    pub queues: Queues,
    pub closed: bool,
}

impl QueueState {
    /// Swaps out everything queued so far.
    pub fn take(&mut self) -> Queues {
        std::mem::take(&mut self.queues)
    }
}
