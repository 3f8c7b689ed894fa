//! The task-spawned worker pool: one task per submitted item.
//!
//! No shared queue, no fixed worker count — the runtime's scheduler does the
//! load balancing. Per-item overhead is higher than the hybrid pool's, which
//! matters above roughly 10k operations per second; below that the
//! simplicity usually wins. Queue time is not measured and
//! `worker_threads_used` stays zero.

use std::future::Future;
use std::marker::PhantomData;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{run_guarded, DrainOutcome, WorkItem};
use crate::collector::{CollectorEvent, CollectorHandle};

/// How one spawned task ended.
enum TaskExit {
    /// Reported a `StepResult`.
    Completed,
    /// Cancelled after `RequestStarted`, before a result.
    CancelledInFlight,
    /// Cancelled before it ever started; reported nothing.
    Unstarted,
}

pub(crate) struct SpawnedPool<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    action: F,
    collector: CollectorHandle,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<TaskExit>>,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> SpawnedPool<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    pub(crate) fn new(action: F, collector: CollectorHandle, cancel: CancellationToken) -> Self {
        Self { action, collector, cancel, tasks: Vec::new(), _future: PhantomData }
    }

    /// Spawn a task for one item and let it run to completion on its own.
    pub(crate) fn submit(&mut self, _item: WorkItem) {
        let action = self.action.clone();
        let collector = self.collector.clone();
        let cancel = self.cancel.clone();

        self.tasks.push(tokio::spawn(async move {
            if cancel.is_cancelled() {
                return TaskExit::Unstarted;
            }

            let started_at = Instant::now();
            collector.emit(CollectorEvent::RequestStarted);

            let outcome = tokio::select! {
                success = run_guarded(action()) => Some(success),
                _ = cancel.cancelled() => None,
            };

            match outcome {
                Some(success) => {
                    collector.emit(CollectorEvent::StepResult {
                        success,
                        service_time_ms: started_at.elapsed().as_secs_f64() * 1000.0,
                        queue_time_ms: None,
                    });
                    TaskExit::Completed
                }
                None => TaskExit::CancelledInFlight,
            }
        }));
    }

    /// Wait for outstanding tasks within `graceful`, cancel the rest.
    pub(crate) async fn shutdown(self, graceful: Duration) -> DrainOutcome {
        debug!(outstanding = self.tasks.len(), "draining spawned pool");

        let drain = join_all(self.tasks);
        tokio::pin!(drain);

        let exits = if graceful.is_zero() {
            self.cancel.cancel();
            drain.await
        } else {
            tokio::select! {
                exits = &mut drain => exits,
                _ = tokio::time::sleep(graceful) => {
                    debug!(budget = ?graceful, "graceful budget expired, cancelling tasks");
                    self.cancel.cancel();
                    drain.await
                }
            }
        };

        let cancelled_in_flight = exits
            .into_iter()
            .map(|exit| match exit {
                Ok(TaskExit::CancelledInFlight) => 1,
                Ok(_) => 0,
                Err(e) => {
                    error!("spawned worker task panicked: {e}");
                    0
                }
            })
            .sum();

        DrainOutcome { cancelled_in_flight }
    }
}
