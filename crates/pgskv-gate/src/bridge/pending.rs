//! Completion handles for bridged requests.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use pgskv_common::{GateError, GateResult};
use pgskv_store::{SkvResponse, SkvStatus};
use tokio::sync::oneshot;

/// A result type that can carry a failure status.
///
/// Lets the bridge complete any request with a status when the request
/// never reaches the substrate.
pub trait FromStatus {
    /// Builds a failed result.
    fn from_status(status: SkvStatus) -> Self;
}

impl FromStatus for SkvStatus {
    fn from_status(status: SkvStatus) -> Self {
        status
    }
}

impl<T> FromStatus for SkvResponse<T> {
    fn from_status(status: SkvStatus) -> Self {
        SkvResponse::status(status)
    }
}

impl<T> FromStatus for GateResult<T> {
    fn from_status(status: SkvStatus) -> Self {
        Err(GateError::internal(status.message))
    }
}

/// Creates a connected sender and pending result.
pub(crate) fn channel<T>() -> (oneshot::Sender<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    (tx, Pending { rx })
}

/// The eventual result of a bridged request.
///
/// Await it from async code or call [`Pending::wait`] from a plain thread.
/// It always completes: if the producing side goes away without answering,
/// the result is a 500 status.
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
}

impl<T: FromStatus> Pending<T> {
    /// Creates an already completed result.
    pub fn ready(value: T) -> Self {
        let (tx, pending) = channel();
        // the receiver is held by `pending`, so this cannot fail
        let _ = tx.send(value);
        pending
    }

    /// Blocks the calling thread until the result is available.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(self) -> T {
        self.rx.blocking_recv().unwrap_or_else(|_| T::from_status(dropped()))
    }
}

impl<T: FromStatus> Future for Pending<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(value)) => Poll::Ready(value),
            Poll::Ready(Err(_)) => Poll::Ready(T::from_status(dropped())),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn dropped() -> SkvStatus {
    SkvStatus::internal_error("request dropped before completion")
}
