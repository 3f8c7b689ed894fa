//! The hybrid worker pool: a fixed set of long-lived workers draining a
//! shared queue.
//!
//! Submission pushes a [`WorkItem`] onto an MPMC channel; each worker loops
//! receive → measure → execute → report. The queue is unbounded by default
//! (submission never blocks the scheduler); a bounded queue makes submission
//! back-pressure instead.
//!
//! # Shutdown
//!
//! 1. The orchestrator closes the submission side.
//! 2. Workers keep draining until the queue is empty, then exit.
//! 3. [`HybridPool::shutdown`] awaits all workers under the graceful budget.
//! 4. On expiry the cancellation token fires: items still queued are dropped
//!    without ever reporting, and started-but-unfinished operations are
//!    abandoned and counted so the collector can reconcile its in-flight
//!    number.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{run_guarded, DrainOutcome, WorkItem};
use crate::collector::{CollectorEvent, CollectorHandle};
use crate::error::EngineError;

pub(crate) struct HybridPool {
    queue_tx: async_channel::Sender<WorkItem>,
    workers: Vec<JoinHandle<u64>>,
    cancel: CancellationToken,
}

impl HybridPool {
    /// Spawn `worker_count` workers around a fresh queue and announce the
    /// pool size to the collector.
    pub(crate) fn spawn<F, Fut>(
        worker_count: usize,
        capacity: Option<usize>,
        measure_queue_time: bool,
        action: F,
        collector: CollectorHandle,
        cancel: CancellationToken,
    ) -> Self
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let (queue_tx, queue_rx) = match capacity {
            Some(n) => async_channel::bounded(n),
            None => async_channel::unbounded(),
        };

        collector.emit(CollectorEvent::WorkerThreadCount(worker_count));
        debug!(workers = worker_count, bounded = capacity.is_some(), "spawning hybrid pool");

        let workers = (0..worker_count)
            .map(|id| {
                let queue_rx = queue_rx.clone();
                let action = action.clone();
                let collector = collector.clone();
                let cancel = cancel.clone();
                tokio::spawn(worker_loop(id, queue_rx, action, collector, cancel, measure_queue_time))
            })
            .collect();

        Self { queue_tx, workers, cancel }
    }

    /// Enqueue one item. Awaits queue space when the channel is bounded.
    pub(crate) async fn submit(&self, item: WorkItem) -> Result<(), EngineError> {
        self.queue_tx
            .send(item)
            .await
            .map_err(|_| EngineError::PoolUnavailable { context: "work queue closed" })
    }

    /// Close the queue, drain within `graceful`, cancel the rest.
    pub(crate) async fn shutdown(self, graceful: Duration) -> DrainOutcome {
        self.queue_tx.close();

        let drain = join_all(self.workers);
        tokio::pin!(drain);

        let exits = if graceful.is_zero() {
            self.cancel.cancel();
            drain.await
        } else {
            tokio::select! {
                exits = &mut drain => exits,
                _ = tokio::time::sleep(graceful) => {
                    debug!(budget = ?graceful, "graceful budget expired, cancelling workers");
                    self.cancel.cancel();
                    drain.await
                }
            }
        };

        let cancelled_in_flight = exits
            .into_iter()
            .map(|exit| match exit {
                Ok(abandoned) => abandoned,
                Err(e) => {
                    // A panicked worker loses nothing but its own tally; the
                    // guarded action already turned user panics into failures.
                    error!("hybrid worker panicked: {e}");
                    0
                }
            })
            .sum();

        DrainOutcome { cancelled_in_flight }
    }
}

/// One worker: receive, measure, execute, report, until the queue closes or
/// cancellation fires. Returns how many started operations it abandoned.
async fn worker_loop<F, Fut>(
    id: usize,
    queue_rx: async_channel::Receiver<WorkItem>,
    action: F,
    collector: CollectorHandle,
    cancel: CancellationToken,
    measure_queue_time: bool,
) -> u64
where
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    debug!(worker = id, "hybrid worker started");
    let mut abandoned: u64 = 0;

    loop {
        let item = tokio::select! {
            _ = cancel.cancelled() => break,
            received = queue_rx.recv() => match received {
                Ok(item) => item,
                // Queue closed and fully drained.
                Err(_) => break,
            },
        };

        let started_at = Instant::now();
        let queue_time = started_at.duration_since(item.enqueued_at);
        collector.emit(CollectorEvent::RequestStarted);

        let outcome = tokio::select! {
            success = run_guarded(action()) => Some(success),
            _ = cancel.cancelled() => None,
        };

        match outcome {
            Some(success) => collector.emit(CollectorEvent::StepResult {
                success,
                service_time_ms: started_at.elapsed().as_secs_f64() * 1000.0,
                queue_time_ms: measure_queue_time.then(|| queue_time.as_secs_f64() * 1000.0),
            }),
            None => {
                // Started but never finished: no StepResult, not counted
                // as success or failure.
                abandoned += 1;
                break;
            }
        }
    }

    debug!(worker = id, abandoned, "hybrid worker exiting");
    abandoned
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector;

    fn pool_fixture(
        worker_count: usize,
        action: impl Fn() -> futures::future::BoxFuture<'static, bool> + Send + Sync + Clone + 'static,
    ) -> (HybridPool, collector::CollectorHandle) {
        let (handle, _task) = collector::spawn("hybrid-test".into(), Instant::now(), false);
        let pool = HybridPool::spawn(
            worker_count,
            None,
            false,
            action,
            handle.clone(),
            CancellationToken::new(),
        );
        (pool, handle)
    }

    #[tokio::test]
    async fn spawns_expected_number_of_workers() {
        let (pool, _handle) = pool_fixture(10, || Box::pin(async { true }));
        assert_eq!(pool.workers.len(), 10);
        pool.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn drains_all_items_before_exiting() {
        let (pool, handle) = pool_fixture(4, || Box::pin(async { true }));

        for _ in 0..50 {
            pool.submit(WorkItem { enqueued_at: Instant::now() }).await.unwrap();
        }
        let outcome = pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(outcome.cancelled_in_flight, 0);

        let result = handle.load_result(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.total, 50);
        assert_eq!(result.success, 50);
        assert_eq!(result.requests_started, 50);
        assert_eq!(result.requests_in_flight, 0);
    }

    #[tokio::test]
    async fn zero_budget_abandons_started_work() {
        let (pool, handle) = pool_fixture(2, || {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                true
            })
        });

        for _ in 0..10 {
            pool.submit(WorkItem { enqueued_at: Instant::now() }).await.unwrap();
        }
        // Give the workers a beat to pick up their first items.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let outcome = pool.shutdown(Duration::ZERO).await;
        assert_eq!(outcome.cancelled_in_flight, 2);

        let result = handle.load_result(Duration::from_secs(5)).await.unwrap();
        // Two items started, none completed, the rest dropped unstarted.
        assert_eq!(result.requests_started, 2);
        assert_eq!(result.total, 0);
    }

    #[tokio::test]
    async fn user_panics_become_failures() {
        let (pool, handle) = pool_fixture(2, || Box::pin(async { panic!("boom") }));

        for _ in 0..4 {
            pool.submit(WorkItem { enqueued_at: Instant::now() }).await.unwrap();
        }
        let outcome = pool.shutdown(Duration::from_secs(5)).await;
        assert_eq!(outcome.cancelled_in_flight, 0);

        let result = handle.load_result(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.failure, 4);
        assert_eq!(result.success, 0);
    }
}
