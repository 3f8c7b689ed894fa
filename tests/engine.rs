//! End-to-end runs of the engine against short timed plans.
//!
//! Timing assertions use generous windows: the point is the shape of the
//! accounting (counts, modes, drain behavior), not microsecond precision.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pacer::{
    run, EngineError, LoadExecutionPlan, LoadSettings, TerminationMode, WorkerConfiguration,
    WorkerMode,
};

fn plan<F, Fut>(name: &str, settings: LoadSettings, action: F) -> LoadExecutionPlan<F, Fut>
where
    F: Fn() -> Fut + Send + Sync + Clone + 'static,
    Fut: std::future::Future<Output = bool> + Send,
{
    LoadExecutionPlan::builder().name(name).settings(settings).action(action).build()
}

/// Engine logs are handy when a timing assertion goes sideways; run with
/// `cargo test -- --nocapture` to see them.
fn trace_init() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counts_full_batches_in_complete_current_interval_mode() {
    trace_init();
    let settings = LoadSettings::builder()
        .concurrency(10)
        .interval(Duration::from_millis(100))
        .duration(Duration::from_secs(1))
        .termination_mode(TerminationMode::CompleteCurrentInterval)
        .build();

    let result = run(&plan("basic-counting", settings, || async { true }), WorkerConfiguration::default())
        .await
        .unwrap();

    assert!(
        (10..=11).contains(&result.batches_completed),
        "batches_completed = {}",
        result.batches_completed
    );
    // Every batch is full width and every item completes.
    assert_eq!(result.total, 10 * result.batches_completed);
    assert_eq!(result.success, result.total);
    assert_eq!(result.failure, 0);
    assert_eq!(result.requests_started, result.total);
    assert_eq!(result.requests_in_flight, 0);
    assert!(result.p95_latency_ms < 50.0, "p95 = {}", result.p95_latency_ms);

    // Latency ordering invariants hold on a real run.
    assert!(result.min_latency_ms <= result.avg_latency_ms);
    assert!(result.avg_latency_ms <= result.max_latency_ms);
    assert!(result.median_latency_ms <= result.p95_latency_ms);
    assert!(result.p95_latency_ms <= result.p99_latency_ms);
    assert!(result.p99_latency_ms <= result.max_latency_ms);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn iteration_cap_trims_the_run_exactly() {
    trace_init();
    let settings = LoadSettings::builder()
        .concurrency(10)
        .interval(Duration::from_millis(10))
        .duration(Duration::from_secs(60))
        .max_iterations(100)
        .build();

    let result =
        run(&plan("iteration-cap", settings, || async { true }), WorkerConfiguration::default())
            .await
            .unwrap();

    assert_eq!(result.requests_started, 100);
    assert_eq!(result.total, 100);
    assert_eq!(result.success, 100);
    assert_eq!(result.batches_completed, 10);
    // The cap ends the run long before the time budget.
    assert!(result.time_seconds < 10.0, "time_seconds = {}", result.time_seconds);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn strict_duration_cancels_in_flight_work() {
    trace_init();
    let settings = LoadSettings::builder()
        .concurrency(5)
        .interval(Duration::from_millis(50))
        .duration(Duration::from_millis(500))
        .termination_mode(TerminationMode::StrictDuration)
        .build();

    let result = run(
        &plan("strict-cancel", settings, || async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            true
        }),
        WorkerConfiguration::default(),
    )
    .await
    .unwrap();

    // Nothing finished, nothing failed; started work was abandoned at the
    // boundary and reconciled out of the in-flight count.
    assert_eq!(result.total, 0);
    assert_eq!(result.success, 0);
    assert_eq!(result.failure, 0);
    assert!(result.requests_started > 0);
    assert_eq!(result.requests_in_flight, 0);
    assert!(result.time_seconds < 2.0, "time_seconds = {}", result.time_seconds);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn alternating_outcomes_split_evenly() {
    trace_init();
    let calls = Arc::new(AtomicU64::new(0));
    let counter = calls.clone();
    let action = move || {
        let counter = counter.clone();
        async move { counter.fetch_add(1, Ordering::Relaxed) % 2 == 0 }
    };

    let settings = LoadSettings::builder()
        .concurrency(4)
        .interval(Duration::from_millis(50))
        .duration(Duration::from_millis(400))
        .termination_mode(TerminationMode::CompleteCurrentInterval)
        .build();

    let result = run(&plan("mixed-success", settings, action), WorkerConfiguration::default())
        .await
        .unwrap();

    assert_eq!(result.total, result.success + result.failure);
    assert!(
        result.success.abs_diff(result.failure) <= 1,
        "success = {}, failure = {}",
        result.success,
        result.failure
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn graceful_drain_finishes_started_work() {
    trace_init();
    let settings = LoadSettings::builder()
        .concurrency(4)
        .interval(Duration::from_millis(100))
        .duration(Duration::from_secs(1))
        .graceful_stop_timeout(Duration::from_millis(500))
        .build();
    let config = WorkerConfiguration::builder().max_worker_threads(32).build();

    let result = run(
        &plan("graceful-drain", settings, || async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            true
        }),
        config,
    )
    .await
    .unwrap();

    // Everything that started completed inside the grace window.
    assert_eq!(result.total, result.requests_started);
    assert_eq!(result.failure, 0);
    assert_eq!(result.requests_in_flight, 0);
    assert!(result.total > 0);
    assert!(
        result.time_seconds >= 1.0 && result.time_seconds < 1.5,
        "time_seconds = {}",
        result.time_seconds
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn zero_duration_returns_an_empty_result() {
    trace_init();
    let settings = LoadSettings::builder()
        .concurrency(10)
        .interval(Duration::from_millis(100))
        .duration(Duration::ZERO)
        .build();

    let result = run(&plan("zero-duration", settings, || async { true }), WorkerConfiguration::default())
        .await
        .unwrap();

    assert_eq!(result.total, 0);
    assert_eq!(result.requests_started, 0);
    assert_eq!(result.batches_completed, 0);
    assert_eq!(result.requests_per_second, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn interval_equal_to_duration_yields_one_batch() {
    trace_init();
    let settings = LoadSettings::builder()
        .concurrency(1)
        .interval(Duration::from_millis(300))
        .duration(Duration::from_millis(300))
        .build();

    let result = run(&plan("single-batch", settings, || async { true }), WorkerConfiguration::default())
        .await
        .unwrap();

    assert_eq!(result.total, 1);
    assert_eq!(result.batches_completed, 1);
    assert_eq!(result.success, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn task_spawned_mode_reports_no_pool_figures() {
    trace_init();
    let settings = LoadSettings::builder()
        .concurrency(10)
        .interval(Duration::from_millis(100))
        .duration(Duration::from_millis(500))
        .termination_mode(TerminationMode::CompleteCurrentInterval)
        .build();
    let config = WorkerConfiguration::builder().mode(WorkerMode::TaskSpawned).build();

    let result = run(&plan("task-spawned", settings, || async { true }), config).await.unwrap();

    assert!(result.total > 0);
    assert_eq!(result.success, result.total);
    assert_eq!(result.worker_threads_used, 0);
    assert_eq!(result.avg_queue_time_ms, 0.0);
    assert_eq!(result.max_queue_time_ms, 0.0);
    assert_eq!(result.worker_utilization, 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bounded_queue_back_pressures_without_losing_work() {
    trace_init();
    let settings = LoadSettings::builder()
        .concurrency(10)
        .interval(Duration::from_millis(50))
        .duration(Duration::from_millis(300))
        .build();
    let config = WorkerConfiguration::builder().channel_capacity(8).build();

    let result = run(&plan("bounded-queue", settings, || async { true }), config).await.unwrap();

    assert!(result.total > 0);
    assert_eq!(result.success, result.total);
    assert_eq!(result.failure, 0);
    assert_eq!(result.requests_in_flight, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn detailed_metrics_report_queue_time_and_memory() {
    trace_init();
    let settings = LoadSettings::builder()
        .concurrency(8)
        .interval(Duration::from_millis(50))
        .duration(Duration::from_millis(500))
        .build();
    let config = WorkerConfiguration::builder().enable_detailed_metrics(true).build();

    let result = run(
        &plan("detailed-metrics", settings, || async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            true
        }),
        config,
    )
    .await
    .unwrap();

    assert!(result.total > 0);
    assert!(result.max_queue_time_ms >= result.avg_queue_time_ms);
    // Observational only — any positive RSS reading is acceptable.
    assert!(result.peak_memory_bytes > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn identical_capped_plans_agree_run_to_run() {
    trace_init();
    let settings = LoadSettings::builder()
        .concurrency(6)
        .interval(Duration::from_millis(10))
        .duration(Duration::from_secs(30))
        .max_iterations(60)
        .build();

    let first = run(&plan("rerun", settings, || async { true }), WorkerConfiguration::default())
        .await
        .unwrap();
    let second = run(&plan("rerun", settings, || async { true }), WorkerConfiguration::default())
        .await
        .unwrap();

    assert_eq!(first.total, second.total);
    assert_eq!(first.success, second.success);
    assert_eq!(first.failure, second.failure);
}

#[tokio::test]
async fn reserved_worker_mode_fails_before_any_work() {
    trace_init();
    let settings = LoadSettings::builder()
        .concurrency(1)
        .interval(Duration::from_millis(100))
        .duration(Duration::from_secs(1))
        .build();
    let config = WorkerConfiguration::builder().mode(WorkerMode::Dedicated).build();

    let err = run(&plan("dedicated", settings, || async { true }), config).await.unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedWorkerMode { mode: "dedicated" }));
}

#[tokio::test]
async fn invalid_settings_fail_before_any_work() {
    trace_init();
    let settings = LoadSettings::builder()
        .concurrency(0)
        .interval(Duration::from_millis(100))
        .duration(Duration::from_secs(1))
        .build();

    let err = run(&plan("invalid", settings, || async { true }), WorkerConfiguration::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidConcurrency));
}
