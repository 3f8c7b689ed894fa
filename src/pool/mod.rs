//! Worker pools — the executors that turn submitted work items into
//! measured operations.
//!
//! Two strategies share one contract: accept [`WorkItem`]s from the
//! orchestrator, run the user action once per item with the measure-and-emit
//! dance (`RequestStarted`, guarded execution, `StepResult`), and drain on
//! shutdown under a graceful budget, cancelling whatever the budget cannot
//! cover.

mod hybrid;
mod spawned;

pub(crate) use hybrid::HybridPool;
pub(crate) use spawned::SpawnedPool;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::collector::CollectorHandle;
use crate::error::EngineError;
use crate::worker::{WorkerConfiguration, WorkerMode};

/// One unit of load: a pending invocation of the user action.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WorkItem {
    /// When the orchestrator submitted the item; basis of queue time.
    pub enqueued_at: Instant,
}

/// What the drain left behind.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct DrainOutcome {
    /// Items that had started executing when cancellation fired. They emit
    /// no `StepResult` and count as neither success nor failure; the
    /// orchestrator reconciles the collector's in-flight counter with this.
    pub cancelled_in_flight: u64,
}

/// Run the user action with panics converted to a failed request.
pub(crate) async fn run_guarded<Fut>(fut: Fut) -> bool
where
    Fut: Future<Output = bool>,
{
    AssertUnwindSafe(fut).catch_unwind().await.unwrap_or(false)
}

/// The executor selected by [`WorkerMode`].
pub(crate) enum WorkerPool<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    Hybrid(HybridPool),
    Spawned(SpawnedPool<F, Fut>),
}

impl<F, Fut> WorkerPool<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    /// Build the pool for one run. The hybrid pool spawns its workers here
    /// and reports its fixed size to the collector; the task-spawned pool
    /// has nothing to report.
    pub(crate) fn build(
        config: &WorkerConfiguration,
        concurrency: usize,
        action: F,
        collector: CollectorHandle,
        cancel: CancellationToken,
    ) -> Result<Self, EngineError> {
        match config.mode {
            WorkerMode::Hybrid => Ok(Self::Hybrid(HybridPool::spawn(
                config.hybrid_worker_count(concurrency),
                config.channel_capacity,
                config.enable_detailed_metrics,
                action,
                collector,
                cancel,
            ))),
            WorkerMode::TaskSpawned => Ok(Self::Spawned(SpawnedPool::new(action, collector, cancel))),
            WorkerMode::Dedicated => {
                Err(EngineError::UnsupportedWorkerMode { mode: config.mode.name() })
            }
        }
    }

    /// Submit one item. Back-pressures when the hybrid queue is bounded.
    pub(crate) async fn submit(&mut self, item: WorkItem) -> Result<(), EngineError> {
        match self {
            Self::Hybrid(pool) => pool.submit(item).await,
            Self::Spawned(pool) => {
                pool.submit(item);
                Ok(())
            }
        }
    }

    /// Stop accepting work, drain within `graceful`, cancel the remainder.
    pub(crate) async fn shutdown(self, graceful: Duration) -> DrainOutcome {
        match self {
            Self::Hybrid(pool) => pool.shutdown(graceful).await,
            Self::Spawned(pool) => pool.shutdown(graceful).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guarded_execution_absorbs_panics() {
        assert!(run_guarded(async { true }).await);
        assert!(!run_guarded(async { false }).await);
        assert!(!run_guarded(async { panic!("user operation blew up") }).await);
    }
}
