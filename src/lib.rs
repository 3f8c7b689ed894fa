//! Pacer — a programmable load-generation engine for Rust.
//!
//! Pacer takes a user-supplied asynchronous operation and a timing plan
//! (concurrency, interval, duration, optional iteration cap), executes the
//! operation repeatedly at the planned rate, measures per-request latency,
//! and produces one aggregated [`LoadResult`] — counts, throughput, latency
//! percentiles, and resource telemetry.
//!
//! # Architecture
//!
//! Four cooperating pieces:
//!
//! - [`LoadExecutionPlan`] / [`LoadSettings`]: what to run and when. The
//!   action is an async closure returning `true` on success.
//! - A worker pool, selected by [`WorkerMode`]: either a fixed set of
//!   long-lived workers draining a shared queue (hybrid, the default), or
//!   one spawned task per operation (task-spawned). Workers measure each
//!   operation and stream events to the collector.
//! - The result collector: a single-consumer task that absorbs per-request
//!   events without locks and finalizes the report on demand.
//! - [`LoadExecutor`]: the orchestrator. It emits batches on drift-free
//!   absolute ticks, decides when to stop (three [`TerminationMode`]s plus
//!   the iteration cap), drains in-flight work under the graceful-stop
//!   budget, and returns the report.
//!
//! # Design goals
//!
//! - Bounded scheduling drift while sustaining tens of thousands of
//!   operations per second — batch ticks are absolute, never cumulative.
//! - Clean reconciliation of "the clock ran out" with "work is still in
//!   flight": drain, then cancel, with every started-but-abandoned item
//!   accounted for rather than miscounted.
//! - Accurate tail statistics: upper nearest-rank percentiles over every
//!   completed sample, never over cancelled ones.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use pacer::{run, LoadExecutionPlan, LoadSettings, WorkerConfiguration};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pacer::EngineError> {
//!     let plan = LoadExecutionPlan::builder()
//!         .name("smoke")
//!         .settings(
//!             LoadSettings::builder()
//!                 .concurrency(10)
//!                 .interval(Duration::from_millis(100))
//!                 .duration(Duration::from_secs(5))
//!                 .build(),
//!         )
//!         // Capture heavy resources (clients, sockets) outside the closure.
//!         .action(|| async { true })
//!         .build();
//!
//!     let result = run(&plan, WorkerConfiguration::default()).await?;
//!     println!("{result}");
//!     Ok(())
//! }
//! ```
//!
//! # Failure semantics
//!
//! A user operation that returns `false` or panics is recorded as a failed
//! request — never retried, never surfaced as an error. [`EngineError`] is
//! reserved for invalid configuration (rejected before any work starts) and
//! for infrastructure faults such as a drain that exceeds the engine's hard
//! ceiling.

/// Single-consumer aggregation of per-request events
mod collector;
/// Engine and configuration errors
mod error;
/// The orchestrator that drives a run end to end
mod executor;
/// Best-effort process memory sampling
mod memory;
/// Timing plans and the operation under test
mod plan;
/// Worker pools that execute the plan's operations
mod pool;
/// The finalized report and its statistics
mod report;
/// Executor selection and tuning
mod worker;

pub use error::EngineError;
pub use executor::{run, LoadExecutor};
pub use plan::{LoadExecutionPlan, LoadSettings, TerminationMode};
pub use report::LoadResult;
pub use worker::{WorkerConfiguration, WorkerMode};
