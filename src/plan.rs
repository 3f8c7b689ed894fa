//! The [`LoadExecutionPlan`] and [`LoadSettings`] define the workload layer
//! of pacer.
//!
//! A *plan* represents a complete load-run definition — it names the run,
//! carries the timing plan ([`LoadSettings`]), and supplies the operation to
//! execute (`action`).
//!
//! Plans are constructed with [`typed_builder::TypedBuilder`] and passed to a
//! [`crate::LoadExecutor`], acting as an immutable configuration object for
//! exactly one run.
//!
//! # Notes on `action`
//!
//! The `action` is the user-provided async closure executed once per work
//! item; it returns `true` for success and `false` for failure. Guidelines:
//!
//! - **Closure capture for shared state:** the action receives no arguments,
//!   so capture any shared clients or resources in the closure.
//! - **No heavy initialization inside the action:** constructing expensive
//!   objects per invocation (a new HTTP client, say) will collapse throughput
//!   by orders of magnitude. Build once outside, clone a cheap handle inside.
//! - **Own your error handling:** the engine records a panic as `false` but
//!   never retries; map errors to the boolean yourself if you need more
//!   control.

use std::future::Future;
use std::time::Duration;
use typed_builder::TypedBuilder;

use crate::error::EngineError;

/// Lower bound of the derived graceful-stop budget.
const GRACEFUL_FLOOR: Duration = Duration::from_secs(5);
/// Upper bound of the derived graceful-stop budget.
const GRACEFUL_CEIL: Duration = Duration::from_secs(60);

/// Policy governing how the stop boundary interacts with in-flight work and
/// mid-batch cut-offs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TerminationMode {
    /// Stop scheduling the moment the duration elapses, even mid-batch, then
    /// drain in-flight work under the graceful-stop budget.
    #[default]
    Duration,
    /// Emit the batch that begins at or before the duration boundary in full,
    /// then drain. Every emitted batch is `concurrency` wide.
    CompleteCurrentInterval,
    /// Like [`TerminationMode::Duration`], but the graceful budget is zero:
    /// in-flight operations are cancelled at the boundary.
    StrictDuration,
}

/// The timing plan: how many, how often, for how long.
///
/// `concurrency` items are submitted per batch, one batch per `interval`,
/// until `duration` elapses or `max_iterations` items have been submitted.
#[derive(Clone, Copy, Debug, TypedBuilder)]
pub struct LoadSettings {
    /// Items submitted per batch. Must be positive.
    pub concurrency: usize,

    /// Wall-clock window after which no new batches are scheduled.
    pub duration: Duration,

    /// Gap between batch submissions. Must be positive.
    pub interval: Duration,

    /// Hard cap on items submitted across the whole run. The final batch is
    /// trimmed so total submissions equal the cap exactly.
    #[builder(default, setter(strip_option))]
    pub max_iterations: Option<u64>,

    /// How the stop boundary treats in-flight work.
    #[builder(default)]
    pub termination_mode: TerminationMode,

    /// Maximum drain time before in-flight work is cancelled. Defaults to
    /// `clamp(duration × 0.30, 5s, 60s)`.
    #[builder(default, setter(strip_option))]
    pub graceful_stop_timeout: Option<Duration>,
}

impl LoadSettings {
    /// Fail fast on a timing plan that cannot drive a run.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.concurrency == 0 {
            return Err(EngineError::InvalidConcurrency);
        }
        if self.interval.is_zero() {
            return Err(EngineError::InvalidInterval);
        }
        if self.max_iterations == Some(0) {
            return Err(EngineError::InvalidMaxIterations);
        }
        Ok(())
    }

    /// The effective graceful-stop budget for this plan.
    ///
    /// [`TerminationMode::StrictDuration`] always yields zero; otherwise an
    /// explicit timeout wins, and the default is 30% of the duration clamped
    /// to `[5s, 60s]`.
    pub fn graceful_stop(&self) -> Duration {
        if self.termination_mode == TerminationMode::StrictDuration {
            return Duration::ZERO;
        }
        self.graceful_stop_timeout
            .unwrap_or_else(|| self.duration.mul_f64(0.30).clamp(GRACEFUL_FLOOR, GRACEFUL_CEIL))
    }
}

/// A named [`LoadSettings`] plus the operation under test.
///
/// `LoadExecutionPlan` is generic over:
/// - `F`: the closure producing the asynchronous operation.
/// - `Fut`: the future returned by the action, resolving to the success flag.
#[derive(Debug, Clone, TypedBuilder)]
pub struct LoadExecutionPlan<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = bool> + Send,
{
    /// A human-readable name identifying this run.
    #[builder(setter(into))]
    pub name: String,

    /// The timing plan.
    pub settings: LoadSettings,

    /// The operation executed once per work item.
    ///
    /// Usually an async closure returning `true` on success. Capture shared
    /// state outside the closure and avoid heavy per-call initialization.
    pub action: F,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(duration: Duration) -> LoadSettings {
        LoadSettings::builder()
            .concurrency(10)
            .duration(duration)
            .interval(Duration::from_millis(100))
            .build()
    }

    #[test]
    fn rejects_zero_concurrency() {
        let s = LoadSettings::builder()
            .concurrency(0)
            .duration(Duration::from_secs(1))
            .interval(Duration::from_millis(100))
            .build();
        assert!(matches!(s.validate(), Err(EngineError::InvalidConcurrency)));
    }

    #[test]
    fn rejects_zero_interval() {
        let s = LoadSettings::builder()
            .concurrency(1)
            .duration(Duration::from_secs(1))
            .interval(Duration::ZERO)
            .build();
        assert!(matches!(s.validate(), Err(EngineError::InvalidInterval)));
    }

    #[test]
    fn rejects_zero_iteration_cap() {
        let s = LoadSettings::builder()
            .concurrency(1)
            .duration(Duration::from_secs(1))
            .interval(Duration::from_millis(100))
            .max_iterations(0)
            .build();
        assert!(matches!(s.validate(), Err(EngineError::InvalidMaxIterations)));
    }

    #[test]
    fn zero_duration_is_a_valid_plan() {
        assert!(settings(Duration::ZERO).validate().is_ok());
    }

    #[test]
    fn graceful_stop_is_clamped() {
        // 30% of 10s = 3s, below the 5s floor
        assert_eq!(settings(Duration::from_secs(10)).graceful_stop(), Duration::from_secs(5));
        // 30% of 100s = 30s, inside the window
        assert_eq!(settings(Duration::from_secs(100)).graceful_stop(), Duration::from_secs(30));
        // 30% of 1000s = 300s, above the 60s ceiling
        assert_eq!(settings(Duration::from_secs(1000)).graceful_stop(), Duration::from_secs(60));
    }

    #[test]
    fn explicit_graceful_stop_wins() {
        let s = LoadSettings::builder()
            .concurrency(1)
            .duration(Duration::from_secs(1000))
            .interval(Duration::from_millis(100))
            .graceful_stop_timeout(Duration::from_secs(2))
            .build();
        assert_eq!(s.graceful_stop(), Duration::from_secs(2));
    }

    #[test]
    fn strict_duration_zeroes_the_budget() {
        let s = LoadSettings::builder()
            .concurrency(1)
            .duration(Duration::from_secs(100))
            .interval(Duration::from_millis(100))
            .termination_mode(TerminationMode::StrictDuration)
            .graceful_stop_timeout(Duration::from_secs(30))
            .build();
        assert_eq!(s.graceful_stop(), Duration::ZERO);
    }
}
