//! The load orchestrator: batch scheduling, termination, graceful drain.
//!
//! [`LoadExecutor`] drives one run through four phases. While *running* it
//! emits one batch of `concurrency` items per interval, on absolute ticks
//! (`t0 + k·interval`) so scheduling error never accumulates. When the stop
//! condition fires it *drains*: the pool's submission side closes, in-flight
//! work finishes under the graceful-stop budget, and whatever the budget
//! cannot cover is cancelled. *Reporting* asks the collector for the
//! finalized [`LoadResult`], and teardown releases the pool and collector.
//!
//! A scheduler that wakes late does not fire catch-up batches back to back —
//! that would deform the rate shape. Missed ticks are skipped and a drift
//! warning is logged when the wake is a full interval late.

use std::cmp::max;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::{self, CollectorEvent, CollectorHandle};
use crate::error::EngineError;
use crate::plan::{LoadExecutionPlan, LoadSettings, TerminationMode};
use crate::pool::{WorkItem, WorkerPool};
use crate::report::LoadResult;
use crate::worker::WorkerConfiguration;

/// Floor of the outer drain ceiling. The ceiling itself is
/// `max(60s, duration + 60s)` — generous enough to survive a degraded
/// execution environment; exceeding it is a fatal engine error.
const DRAIN_CEILING_FLOOR: Duration = Duration::from_secs(60);

/// Execute a plan with the given worker configuration and return the
/// finalized report.
///
/// This is the crate's single entry point; it returns when the run has
/// fully drained and reported. A run where every operation failed is still
/// an `Ok` — only configuration and engine failures are errors.
pub async fn run<F, Fut>(
    plan: &LoadExecutionPlan<F, Fut>,
    config: WorkerConfiguration,
) -> Result<LoadResult, EngineError>
where
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    LoadExecutor::new(config).exec(plan).await
}

/// The runtime that executes a [`LoadExecutionPlan`].
///
/// One executor can run any number of plans sequentially; each `exec` call
/// builds a fresh collector and pool that live for exactly that run.
pub struct LoadExecutor {
    config: WorkerConfiguration,
}

impl LoadExecutor {
    pub fn new(config: WorkerConfiguration) -> Self {
        Self { config }
    }

    /// Run the plan to completion and return the aggregated result.
    pub async fn exec<F, Fut>(
        &self,
        plan: &LoadExecutionPlan<F, Fut>,
    ) -> Result<LoadResult, EngineError>
    where
        F: Fn() -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        plan.settings.validate()?;
        self.config.validate()?;
        let settings = &plan.settings;

        let t0 = Instant::now();
        let (collector, collector_task) =
            collector::spawn(plan.name.clone(), t0, self.config.enable_detailed_metrics);
        let cancel = CancellationToken::new();
        let mut pool = WorkerPool::build(
            &self.config,
            settings.concurrency,
            plan.action.clone(),
            collector.clone(),
            cancel.clone(),
        )?;

        info!(
            plan = %plan.name,
            mode = ?self.config.mode,
            concurrency = settings.concurrency,
            interval = ?settings.interval,
            duration = ?settings.duration,
            "starting load run"
        );

        let submitted = schedule_batches(settings, &mut pool, &collector, t0).await?;
        debug!(submitted, "scheduling finished, draining pool");

        let ceiling = max(DRAIN_CEILING_FLOOR, settings.duration + DRAIN_CEILING_FLOOR);
        let outcome = tokio::time::timeout(ceiling, pool.shutdown(settings.graceful_stop()))
            .await
            .map_err(|_| EngineError::DrainTimeout { ceiling })?;

        if outcome.cancelled_in_flight > 0 {
            warn!(
                cancelled = outcome.cancelled_in_flight,
                "abandoned in-flight operations at shutdown"
            );
            collector.emit(CollectorEvent::AdjustInFlight(outcome.cancelled_in_flight));
        }

        let result = collector.load_result(ceiling).await?;

        // Last sender gone: the collector task drains and exits.
        drop(collector);
        let _ = collector_task.await;

        info!(
            plan = %result.name,
            total = result.total,
            rps = result.requests_per_second,
            "load run complete"
        );
        Ok(result)
    }
}

/// The batch scheduling loop. Returns the number of items submitted.
async fn schedule_batches<F, Fut>(
    settings: &LoadSettings,
    pool: &mut WorkerPool<F, Fut>,
    collector: &CollectorHandle,
    t0: Instant,
) -> Result<u64, EngineError>
where
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = bool> + Send + 'static,
{
    if settings.duration.is_zero() {
        return Ok(0);
    }

    let deadline = t0 + settings.duration;
    let mut ticker = tokio::time::interval_at(t0, settings.interval);
    // Never fire back-to-back batches to catch up after a stall.
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut submitted: u64 = 0;
    loop {
        let tick = ticker.tick().await;
        let now = Instant::now();
        let late_by = now.duration_since(tick);
        if late_by >= settings.interval {
            warn!(?late_by, "batch tick fired late; keeping the scheduled cadence");
        }

        let expired = match settings.termination_mode {
            TerminationMode::Duration | TerminationMode::StrictDuration => now >= deadline,
            // The batch beginning at or before the boundary is still emitted,
            // and always at full width.
            TerminationMode::CompleteCurrentInterval => tick > deadline,
        };
        if expired {
            break;
        }

        let mut width = settings.concurrency as u64;
        if let Some(cap) = settings.max_iterations {
            if submitted >= cap {
                break;
            }
            // Trim so total submissions equal the cap exactly.
            width = width.min(cap - submitted);
        }

        let mut cut_mid_batch = false;
        let mut emitted: u64 = 0;
        for _ in 0..width {
            if settings.termination_mode != TerminationMode::CompleteCurrentInterval
                && Instant::now() >= deadline
            {
                cut_mid_batch = true;
                break;
            }
            pool.submit(WorkItem { enqueued_at: Instant::now() }).await?;
            emitted += 1;
        }
        submitted += emitted;

        // A cut batch never submitted all of its items, so it does not count.
        if emitted > 0 && !cut_mid_batch {
            collector.emit(CollectorEvent::BatchCompleted);
        }
        if cut_mid_batch {
            break;
        }
        if settings.max_iterations.is_some_and(|cap| submitted >= cap) {
            debug!(submitted, "iteration cap reached");
            break;
        }
    }

    Ok(submitted)
}
