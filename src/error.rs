use std::time::Duration;
use thiserror::Error;

/// Canonical error type for the engine.
///
/// Configuration errors are the caller's fault and fail before any work is
/// scheduled. Engine errors abort the run with no partial report. A user
/// operation that returns `false` or panics is *not* an error — it is
/// recorded as a failed request in the [`crate::LoadResult`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// `concurrency` must submit at least one item per batch.
    #[error("concurrency must be greater than zero")]
    InvalidConcurrency,

    /// `interval` must be a positive time span.
    #[error("interval must be greater than zero")]
    InvalidInterval,

    /// `max_iterations`, when set, must allow at least one item.
    #[error("max_iterations must be greater than zero when set")]
    InvalidMaxIterations,

    /// A worker tunable was set to zero.
    #[error("{name} must be greater than zero when set")]
    InvalidWorkerTuning {
        /// Name of the offending tunable (e.g. `"max_worker_threads"`).
        name: &'static str,
    },

    /// The selected worker mode has no executor behind it yet.
    #[error("worker mode `{mode}` is not implemented")]
    UnsupportedWorkerMode {
        /// Display name of the rejected mode.
        mode: &'static str,
    },

    /// The pool failed to drain within the engine's hard ceiling.
    #[error("pool drain exceeded the engine ceiling of {ceiling:?}")]
    DrainTimeout {
        /// The ceiling that was exceeded, `max(60s, duration + 60s)`.
        ceiling: Duration,
    },

    /// The result collector went away or stopped answering.
    #[error("result collector unavailable: {context}")]
    CollectorUnavailable {
        /// What the engine was doing when the collector vanished.
        context: &'static str,
    },

    /// The worker pool refused a work item.
    #[error("worker pool rejected a work item: {context}")]
    PoolUnavailable {
        /// Why the submission failed.
        context: &'static str,
    },
}
