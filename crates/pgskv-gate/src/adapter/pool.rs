//! Bounded worker pool that runs adapter operations.

use std::future::Future;
use std::sync::Arc;

use pgskv_common::{GateError, GateResult};
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::bridge::{channel, Pending};

/// Multi-threaded runtime plus a permit per in-flight operation.
pub(crate) struct WorkerPool {
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(worker_threads: usize, max_in_flight: usize) -> GateResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("pgskv-worker")
            .enable_all()
            .build()
            .map_err(|e| GateError::internal(format!("failed to build worker pool: {e}")))?;
        debug!(worker_threads, max_in_flight, "worker pool started");
        Ok(Self { runtime: Some(runtime), permits: Arc::new(Semaphore::new(max_in_flight)) })
    }

    /// Runs `work` once a permit is free.
    ///
    /// The result always completes: a worker that panics drops its sender,
    /// which surfaces as an internal error.
    pub fn spawn<T, F>(&self, work: F) -> Pending<GateResult<T>>
    where
        T: Send + 'static,
        F: Future<Output = GateResult<T>> + Send + 'static,
    {
        let (reply, pending) = channel();
        let Some(runtime) = &self.runtime else {
            let _ = reply.send(Err(GateError::service_unavailable("worker pool is shut down")));
            return pending;
        };
        let permits = Arc::clone(&self.permits);
        runtime.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                let _ = reply.send(Err(GateError::service_unavailable("worker pool is closed")));
                return;
            };
            let _ = reply.send(work.await);
        });
        pending
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.permits.close();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_spawn_completes() {
        let pool = WorkerPool::new(2, 4).unwrap();
        assert_eq!(pool.spawn(async { Ok(7) }).wait().unwrap(), 7);
        let err = pool.spawn(async { Err::<(), _>(GateError::usage("bad")) }).wait();
        assert!(matches!(err, Err(GateError::Usage { .. })));
    }

    #[test]
    fn test_panicking_worker_still_completes() {
        let pool = WorkerPool::new(1, 1).unwrap();
        let pending = pool.spawn(async {
            if true {
                panic!("worker blew up");
            }
            Ok(())
        });
        assert!(matches!(pending.wait(), Err(GateError::Internal { .. })));
        // the permit came back
        assert_eq!(pool.spawn(async { Ok(1) }).wait().unwrap(), 1);
    }

    #[test]
    fn test_in_flight_bound() {
        let pool = WorkerPool::new(4, 2).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let pending: Vec<_> = (0..16)
            .map(|_| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                pool.spawn(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .collect();
        for p in pending {
            p.wait().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
