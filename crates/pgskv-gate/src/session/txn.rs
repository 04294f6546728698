//! Per-session transaction handle.

use std::sync::Arc;
use std::time::Duration;

use pgskv_common::{GateError, GateResult, TxnId};
use tracing::{debug, warn};

use crate::adapter::Adapter;

/// Lifecycle of the session's current transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// No transaction has been started yet.
    Idle,
    /// A transaction is open.
    Active(TxnId),
    /// The last transaction committed.
    Committed,
    /// The last transaction was aborted or failed to commit.
    Aborted,
}

/// Begins, ends, and restarts the session's transaction.
///
/// At most one transaction is open at a time, and each one is ended exactly
/// once.
#[derive(Debug)]
pub struct TxnHandler {
    adapter: Arc<Adapter>,
    state: TxnState,
    timeout: Duration,
}

impl TxnHandler {
    /// Creates a handler whose transactions time out after `timeout`.
    pub fn new(adapter: Arc<Adapter>, timeout: Duration) -> Self {
        Self { adapter, state: TxnState::Idle, timeout }
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Returns true while a transaction is open.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.state, TxnState::Active(_))
    }

    /// Deadline given to transactions begun from now on.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the deadline for transactions begun from now on.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// The open transaction.
    pub fn txn_id(&self) -> GateResult<TxnId> {
        match self.state {
            TxnState::Active(txn) => Ok(txn),
            state => Err(GateError::invalid_transaction(format!("no open transaction ({state:?})"))),
        }
    }

    /// Begins a transaction; fails if one is already open.
    pub fn begin_transaction(&mut self) -> GateResult<TxnId> {
        if let TxnState::Active(txn) = self.state {
            return Err(GateError::usage(format!("transaction {txn} is already in progress")));
        }
        let txn = self.adapter.begin_transaction(self.timeout).wait()?;
        self.state = TxnState::Active(txn);
        debug!(%txn, timeout = ?self.timeout, "session transaction began");
        Ok(txn)
    }

    /// The open transaction, beginning one if there is none.
    pub fn current_or_begin(&mut self) -> GateResult<TxnId> {
        match self.state {
            TxnState::Active(txn) => Ok(txn),
            _ => self.begin_transaction(),
        }
    }

    /// Commits the open transaction; a no-op without one.
    ///
    /// A failed commit leaves the handler in `Aborted`.
    pub fn commit_transaction(&mut self) -> GateResult<()> {
        let TxnState::Active(txn) = self.state else {
            debug!(state = ?self.state, "commit without an open transaction");
            return Ok(());
        };
        match self.adapter.end_transaction(txn, true).wait() {
            Ok(()) => {
                self.state = TxnState::Committed;
                debug!(%txn, "session transaction committed");
                Ok(())
            }
            Err(e) => {
                self.state = TxnState::Aborted;
                warn!(%txn, error = %e, "commit failed");
                Err(e)
            }
        }
    }

    /// Aborts the open transaction; a no-op without one.
    pub fn abort_transaction(&mut self) -> GateResult<()> {
        let TxnState::Active(txn) = self.state else {
            return Ok(());
        };
        self.state = TxnState::Aborted;
        self.adapter.end_transaction(txn, false).wait()?;
        debug!(%txn, "session transaction aborted");
        Ok(())
    }

    /// Moves the open transaction to `Aborted` without contacting the
    /// substrate, which has already ended it.
    pub fn mark_aborted(&mut self) {
        if let TxnState::Active(txn) = self.state {
            self.state = TxnState::Aborted;
            warn!(%txn, "transaction ended by the substrate");
        }
    }

    /// Aborts the open transaction, if any, and begins a new one.
    pub fn restart_transaction(&mut self) -> GateResult<TxnId> {
        if let Err(e) = self.abort_transaction() {
            warn!(error = %e, "abort before restart failed");
        }
        self.begin_transaction()
    }
}
