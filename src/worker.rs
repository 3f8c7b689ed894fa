//! Executor selection and tuning.
//!
//! A [`WorkerConfiguration`] picks which worker pool executes the plan and
//! how it is sized. The default hybrid pool suits sustained high submission
//! rates; the task-spawned pool trades per-item overhead for the scheduler's
//! own load balancing and is usually fine below ~10k requests per second.

use typed_builder::TypedBuilder;

use crate::error::EngineError;

/// Hard cap on the derived hybrid worker count.
const WORKER_HARD_CAP: usize = 1000;

/// Which executor runs the plan's operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WorkerMode {
    /// Fixed set of long-lived workers draining a shared queue. Bounded
    /// thread overhead at very high submission rates.
    #[default]
    Hybrid,
    /// One spawned task per work item. Simpler, higher per-item overhead.
    TaskSpawned,
    /// Reserved for a pinned-thread pool. Selecting it fails fast.
    Dedicated,
}

impl WorkerMode {
    pub(crate) fn name(self) -> &'static str {
        match self {
            WorkerMode::Hybrid => "hybrid",
            WorkerMode::TaskSpawned => "task-spawned",
            WorkerMode::Dedicated => "dedicated",
        }
    }
}

/// Tuning knobs for the worker pool.
#[derive(Clone, Copy, Debug, TypedBuilder)]
pub struct WorkerConfiguration {
    /// Executor selection.
    #[builder(default)]
    pub mode: WorkerMode,

    /// Fixed worker count for the hybrid pool. Derived from the CPU count
    /// and the plan's concurrency when unset.
    #[builder(default, setter(strip_option))]
    pub max_worker_threads: Option<usize>,

    /// Capacity of the hybrid work queue. Unbounded when unset — the
    /// preferred setting for throughput; a bound makes submission
    /// back-pressure the scheduler instead.
    #[builder(default, setter(strip_option))]
    pub channel_capacity: Option<usize>,

    /// Opt in to queue-wait measurement and process-memory sampling.
    #[builder(default)]
    pub enable_detailed_metrics: bool,
}

impl Default for WorkerConfiguration {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl WorkerConfiguration {
    /// Fail fast on tunables that cannot drive a pool.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.mode == WorkerMode::Dedicated {
            return Err(EngineError::UnsupportedWorkerMode { mode: self.mode.name() });
        }
        if self.max_worker_threads == Some(0) {
            return Err(EngineError::InvalidWorkerTuning { name: "max_worker_threads" });
        }
        if self.channel_capacity == Some(0) {
            return Err(EngineError::InvalidWorkerTuning { name: "channel_capacity" });
        }
        Ok(())
    }

    /// The hybrid pool's worker count for a plan of the given concurrency.
    pub(crate) fn hybrid_worker_count(&self, concurrency: usize) -> usize {
        worker_count_for(num_cpus::get(), self.max_worker_threads, concurrency)
    }
}

/// Pure sizing formula for the hybrid pool.
///
/// Starts at two workers per CPU, scales up with one worker per ten
/// concurrent items, and caps at `min(1000, cpus × 50)` so a huge
/// concurrency setting cannot drown the runtime in tasks. An explicit
/// request overrides the formula entirely.
pub(crate) fn worker_count_for(cpus: usize, requested: Option<usize>, concurrency: usize) -> usize {
    if let Some(n) = requested {
        return n;
    }
    let base = cpus * 2;
    let scaled = base.max(concurrency.div_ceil(10));
    let ceil = WORKER_HARD_CAP.min(cpus * 50);
    scaled.min(ceil)
}
