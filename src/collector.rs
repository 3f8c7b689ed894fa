//! The result collector: a single-consumer actor absorbing per-request
//! events and producing the final [`LoadResult`].
//!
//! One long-lived task owns all run statistics; its inbox is an unbounded
//! mpsc channel so producers on the hot path never block or lock. External
//! code interacts through [`CollectorHandle`], which wraps the sender; the
//! final report is requested with a oneshot reply embedded in the message,
//! awaited by the caller under the engine's timeout budget.
//!
//! Events from a single worker arrive in program order. Events from
//! different workers interleave arbitrarily, which is fine: every aggregate
//! kept here is commutative.

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use crate::error::EngineError;
use crate::memory::MemoryProbe;
use crate::report::{self, LoadResult};

/// An RSS refresh walks the process table; resample at most this often.
const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

/// Messages accepted by the collector task.
pub(crate) enum CollectorEvent {
    /// A work item began executing. Counted here, not at submission.
    RequestStarted,
    /// A work item finished; `service_time_ms` feeds the latency statistics.
    StepResult {
        success: bool,
        service_time_ms: f64,
        queue_time_ms: Option<f64>,
    },
    /// The orchestrator submitted every item of one batch.
    BatchCompleted,
    /// Fixed worker count of the pool. Single-shot; later values are ignored.
    WorkerThreadCount(usize),
    /// `n` started-but-cancelled items will never report a result.
    AdjustInFlight(u64),
    /// Finalize (once) and reply with the report.
    GetLoadResult { resp: oneshot::Sender<LoadResult> },
}

/// Cheap, cloneable sender side of the collector.
#[derive(Clone)]
pub(crate) struct CollectorHandle {
    tx: mpsc::UnboundedSender<CollectorEvent>,
}

impl CollectorHandle {
    /// Fire-and-forget delivery. A closed inbox means the run is already
    /// tearing down; the event is dropped.
    pub(crate) fn emit(&self, event: CollectorEvent) {
        if self.tx.send(event).is_err() {
            debug!("collector inbox closed; event dropped");
        }
    }

    /// Ask for the finalized report, waiting at most `budget`.
    pub(crate) async fn load_result(&self, budget: Duration) -> Result<LoadResult, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(CollectorEvent::GetLoadResult { resp: tx })
            .map_err(|_| EngineError::CollectorUnavailable { context: "inbox closed" })?;
        match tokio::time::timeout(budget, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(EngineError::CollectorUnavailable { context: "reply dropped" }),
            Err(_) => Err(EngineError::CollectorUnavailable { context: "reply timed out" }),
        }
    }
}

/// Spawn the collector task for one run.
///
/// `started_at` is the orchestrator's test-start instant; the report's
/// elapsed time spans from there to the finalization moment, drain tail
/// included.
pub(crate) fn spawn(
    name: String,
    started_at: Instant,
    detailed_metrics: bool,
) -> (CollectorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = CollectorState::new(name, started_at, detailed_metrics);
    let task = tokio::spawn(collector_task(rx, state));
    (CollectorHandle { tx }, task)
}

async fn collector_task(mut rx: mpsc::UnboundedReceiver<CollectorEvent>, mut state: CollectorState) {
    while let Some(event) = rx.recv().await {
        state.apply(event);
    }
    debug!("collector inbox closed; task exiting");
}

struct CollectorState {
    name: String,
    started_at: Instant,
    probe: Option<MemoryProbe>,
    last_memory_sample: Option<Instant>,

    requests_started: u64,
    requests_in_flight: u64,
    success: u64,
    failure: u64,
    batches_completed: u64,
    worker_threads_used: usize,

    service_samples: Vec<f64>,
    service_sum: f64,
    service_min: f64,
    service_max: f64,
    queue_sum: f64,
    queue_max: f64,
    queue_count: u64,
    peak_memory_bytes: u64,

    /// Set on the first `GetLoadResult`; the state is immutable afterwards
    /// and repeated asks return this exact value.
    finalized: Option<LoadResult>,
}

impl CollectorState {
    fn new(name: String, started_at: Instant, detailed_metrics: bool) -> Self {
        Self {
            name,
            started_at,
            probe: detailed_metrics.then(MemoryProbe::new).flatten(),
            last_memory_sample: None,
            requests_started: 0,
            requests_in_flight: 0,
            success: 0,
            failure: 0,
            batches_completed: 0,
            worker_threads_used: 0,
            service_samples: Vec::new(),
            service_sum: 0.0,
            service_min: f64::INFINITY,
            service_max: 0.0,
            queue_sum: 0.0,
            queue_max: 0.0,
            queue_count: 0,
            peak_memory_bytes: 0,
            finalized: None,
        }
    }

    fn apply(&mut self, event: CollectorEvent) {
        match event {
            CollectorEvent::GetLoadResult { resp } => {
                let result = match &self.finalized {
                    Some(cached) => cached.clone(),
                    None => {
                        let fresh = self.finalize();
                        self.finalized = Some(fresh.clone());
                        fresh
                    }
                };
                let _ = resp.send(result);
            }
            // Stragglers from abandoned work must not mutate a published report.
            _ if self.finalized.is_some() => {}
            CollectorEvent::RequestStarted => {
                self.requests_started += 1;
                self.requests_in_flight += 1;
                self.sample_memory();
            }
            CollectorEvent::StepResult { success, service_time_ms, queue_time_ms } => {
                self.requests_in_flight = self.requests_in_flight.saturating_sub(1);
                if success {
                    self.success += 1;
                } else {
                    self.failure += 1;
                }
                self.service_samples.push(service_time_ms);
                self.service_sum += service_time_ms;
                self.service_min = self.service_min.min(service_time_ms);
                self.service_max = self.service_max.max(service_time_ms);
                if let Some(queue_ms) = queue_time_ms {
                    self.queue_sum += queue_ms;
                    self.queue_max = self.queue_max.max(queue_ms);
                    self.queue_count += 1;
                }
            }
            CollectorEvent::BatchCompleted => self.batches_completed += 1,
            CollectorEvent::WorkerThreadCount(n) => {
                if self.worker_threads_used == 0 {
                    self.worker_threads_used = n;
                }
            }
            CollectorEvent::AdjustInFlight(n) => {
                self.requests_in_flight = self.requests_in_flight.saturating_sub(n);
            }
        }
    }

    fn sample_memory(&mut self) {
        let Some(probe) = self.probe.as_mut() else { return };
        let due = self
            .last_memory_sample
            .is_none_or(|at| at.elapsed() >= MEMORY_SAMPLE_INTERVAL);
        if !due {
            return;
        }
        if let Some(rss) = probe.sample() {
            self.peak_memory_bytes = self.peak_memory_bytes.max(rss);
        }
        self.last_memory_sample = Some(Instant::now());
    }

    fn finalize(&self) -> LoadResult {
        let mut sorted = self.service_samples.clone();
        sorted.sort_by(f64::total_cmp);

        let total = self.success + self.failure;
        let elapsed = self.started_at.elapsed();
        let time_seconds = elapsed.as_secs_f64();
        let count = sorted.len() as u64;
        let avg_latency_ms = if count == 0 { 0.0 } else { self.service_sum / count as f64 };

        LoadResult {
            name: self.name.clone(),
            total,
            success: self.success,
            failure: self.failure,
            requests_started: self.requests_started,
            requests_in_flight: self.requests_in_flight,
            batches_completed: self.batches_completed,
            worker_threads_used: self.worker_threads_used,
            time_seconds,
            requests_per_second: report::throughput(total, time_seconds),
            min_latency_ms: if count == 0 { 0.0 } else { self.service_min },
            avg_latency_ms,
            median_latency_ms: report::upper_nearest_rank(&sorted, 0.50),
            p95_latency_ms: report::upper_nearest_rank(&sorted, 0.95),
            p99_latency_ms: report::upper_nearest_rank(&sorted, 0.99),
            max_latency_ms: self.service_max,
            avg_queue_time_ms: if self.queue_count == 0 {
                0.0
            } else {
                self.queue_sum / self.queue_count as f64
            },
            max_queue_time_ms: self.queue_max,
            worker_utilization: report::worker_utilization(
                avg_latency_ms,
                total,
                self.worker_threads_used,
                time_seconds * 1000.0,
            ),
            peak_memory_bytes: self.peak_memory_bytes,
        }
    }
}
