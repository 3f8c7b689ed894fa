//! The finalized report of a load run and the statistics helpers behind it.
//!
//! A [`LoadResult`] is derived once from the collector's raw state when the
//! run finishes. All latency fields are milliseconds as floating point;
//! percentiles use the upper nearest-rank method (`sorted[⌈p·n⌉ − 1]`),
//! which is biased high compared to linear interpolation and therefore never
//! under-reports a tail.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregated outcome of one load run.
///
/// Returned by [`crate::run`] when the run completes, including runs where
/// every user operation failed — an all-failure run is a valid result, not
/// an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadResult {
    /// Name of the execution plan that produced this result.
    pub name: String,
    /// Completed requests (`success + failure`).
    pub total: u64,
    /// Requests whose operation returned `true`.
    pub success: u64,
    /// Requests whose operation returned `false` or panicked.
    pub failure: u64,
    /// Requests that began executing (not merely submitted).
    pub requests_started: u64,
    /// Requests still unaccounted for at finalization. Zero after a clean
    /// drain or a fully propagated cancellation.
    pub requests_in_flight: u64,
    /// Batches whose every item was submitted.
    pub batches_completed: u64,
    /// Fixed worker count of the hybrid pool; zero for the task-spawned pool.
    pub worker_threads_used: usize,
    /// Wall-clock span of the run, from first schedule to finalization,
    /// including the drain tail.
    pub time_seconds: f64,
    /// `total / time_seconds`.
    pub requests_per_second: f64,
    /// Smallest observed service time.
    pub min_latency_ms: f64,
    /// Mean service time.
    pub avg_latency_ms: f64,
    /// Upper nearest-rank p50 of service time.
    pub median_latency_ms: f64,
    /// Upper nearest-rank p95 of service time.
    pub p95_latency_ms: f64,
    /// Upper nearest-rank p99 of service time.
    pub p99_latency_ms: f64,
    /// Largest observed service time.
    pub max_latency_ms: f64,
    /// Mean queue wait; zero when the pool does not measure queue time.
    pub avg_queue_time_ms: f64,
    /// Largest queue wait; zero when the pool does not measure queue time.
    pub max_queue_time_ms: f64,
    /// `min(1.0, avg_latency · total / (workers · elapsed))`, zero without a
    /// fixed worker pool.
    pub worker_utilization: f64,
    /// Best-effort peak process RSS observed during the run. Observational;
    /// zero when detailed metrics were disabled.
    pub peak_memory_bytes: u64,
}

impl LoadResult {
    /// Fraction of completed requests that succeeded, in `[0.0, 1.0]`.
    pub fn success_ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.success as f64 / self.total as f64
    }
}

impl fmt::Display for LoadResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "load result: {}", self.name)?;
        writeln!(
            f,
            "  requests:    {} total, {} ok, {} failed, {} started, {} in flight",
            self.total, self.success, self.failure, self.requests_started, self.requests_in_flight
        )?;
        writeln!(
            f,
            "  throughput:  {:.1} req/s over {:.2}s ({} batches, {} workers, {:.0}% utilized)",
            self.requests_per_second,
            self.time_seconds,
            self.batches_completed,
            self.worker_threads_used,
            self.worker_utilization * 100.0
        )?;
        writeln!(
            f,
            "  latency ms:  min {:.2} / avg {:.2} / p50 {:.2} / p95 {:.2} / p99 {:.2} / max {:.2}",
            self.min_latency_ms,
            self.avg_latency_ms,
            self.median_latency_ms,
            self.p95_latency_ms,
            self.p99_latency_ms,
            self.max_latency_ms
        )?;
        write!(
            f,
            "  queue ms:    avg {:.2} / max {:.2}, peak rss {} bytes",
            self.avg_queue_time_ms, self.max_queue_time_ms, self.peak_memory_bytes
        )
    }
}

/// Upper nearest-rank percentile: `sorted[⌈p · n⌉ − 1]`, rank clamped to
/// `[1, n]`. Returns `0.0` for an empty slice.
///
/// The input must already be sorted ascending.
pub fn upper_nearest_rank(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Requests per second over the run's wall clock. Zero when no time passed.
pub fn throughput(total: u64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds <= 0.0 {
        return 0.0;
    }
    total as f64 / elapsed_seconds
}

/// Share of worker capacity spent inside user operations, capped at `1.0`.
///
/// Zero when the pool has no fixed workers (task-spawned mode) or the run
/// had no measurable span.
pub fn worker_utilization(avg_latency_ms: f64, total: u64, workers: usize, elapsed_ms: f64) -> f64 {
    if workers == 0 || elapsed_ms <= 0.0 {
        return 0.0;
    }
    (avg_latency_ms * total as f64 / (workers as f64 * elapsed_ms)).min(1.0)
}
