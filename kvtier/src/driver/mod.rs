//! The benchmark loop: request admission, completion tracking, write-back
//! scheduling, and progress reporting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tracing::error;

use crate::config::Config;
use crate::stores::{open_store, StoreError, UnitStore};


/// A progress report is emitted after every this many newly completed
/// requests.
pub const PROGRESS_EVERY: u64 = 1000;

/// Receiver for everything the engine reports. All methods default to
/// no-ops, implementations override what they consume.
///
/// Methods are called from the driver task and from blocking worker
/// threads; implementations must be cheap and must not block.
pub trait MetricsSink: Send + Sync + 'static {
    /// One storage read finished.
    fn read_latency(&self, worker_id: usize, latency: Duration) {
        let _ = (worker_id, latency);
    }

    /// Periodic progress, every [`PROGRESS_EVERY`] completions.
    fn progress(&self, progress: &Progress) {
        let _ = progress;
    }

    /// The run finished.
    fn summary(&self, summary: &RunSummary) {
        let _ = summary;
    }
}

#[derive(Debug, Clone)]
pub struct Progress {
    pub completed_requests: u64,
    /// Requests per second since the run started.
    pub overall_rps: f64,
    /// Requests per second since the previous progress report.
    pub recent_rps: f64,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub completed_requests: u64,
    pub elapsed: Duration,
    /// Requests per second over the whole run.
    pub overall_rps: f64,
    /// Write gate slots free when the run ended. Write-backs still in
    /// flight hold the remainder.
    pub write_gate_available: usize,
}

/// Drives logical requests against a store until the configured number has
/// completed.
pub struct Driver {
    config: Config,
    store: Arc<dyn UnitStore>,
    sink: Arc<dyn MetricsSink>,
    write_backs: JoinSet<()>,
}

impl Driver {
    /// Opens the configured store, provisioning `base_path` along the way.
    pub fn new(config: Config, sink: Arc<dyn MetricsSink>) -> Result<Self, StoreError> {
        let store = open_store(&config)?;
        Ok(Self {
            config,
            store,
            sink,
            write_backs: JoinSet::new(),
        })
    }

    /// Runs the benchmark loop until `requests_to_complete` requests have
    /// finished, then reports and returns the summary.
    ///
    /// Admission keeps up to `max_inflight_requests` requests running, each
    /// admitted only after a probe of the write gate observed a free slot.
    /// The probe blocks the driver; releases come from write workers on the
    /// blocking pool, so the wait cannot deadlock. Every completed request
    /// schedules one fire-and-forget round of evicting write-backs. A read
    /// error ends the run; write-back errors are logged and dropped.
    pub async fn run(&mut self) -> Result<RunSummary, StoreError> {
        let target = self.config.requests_to_complete.get();
        let num_workers = self.config.num_workers_per_single_request.get();
        let max_inflight = self.config.max_inflight_requests.get();

        let started = Instant::now();
        let mut completed: u64 = 0;
        let mut last_reported_at = started;
        let mut last_reported_count: u64 = 0;
        let mut inflight: JoinSet<Result<(), StoreError>> = JoinSet::new();

        while completed < target {
            while inflight.len() < max_inflight && completed + (inflight.len() as u64) < target {
                self.store.write_gate().probe();
                inflight.spawn(read_request(
                    Arc::clone(&self.store),
                    Arc::clone(&self.sink),
                    num_workers,
                ));
            }

            // wait for one request, then drain whatever else has finished
            let joined = inflight
                .join_next()
                .await
                .expect("admission put at least one request in flight");
            joined.expect("read request task panicked")?;
            let mut newly_completed: u64 = 1;
            while let Some(joined) = inflight.try_join_next() {
                joined.expect("read request task panicked")?;
                newly_completed += 1;
            }
            completed += newly_completed;

            for _ in 0..newly_completed {
                for worker_id in 0..num_workers {
                    let store = Arc::clone(&self.store);
                    self.write_backs.spawn_blocking(move || {
                        if let Err(error) = store.write_unit(worker_id, true) {
                            error!(%error, worker_id, "write-back failed");
                        }
                    });
                }
            }
            // bookkeeping only; never waits for outstanding write-backs
            while let Some(reaped) = self.write_backs.try_join_next() {
                reaped.expect("write-back task panicked");
            }

            tokio::task::yield_now().await;

            if completed - last_reported_count >= PROGRESS_EVERY {
                let now = Instant::now();
                self.sink.progress(&Progress {
                    completed_requests: completed,
                    overall_rps: completed as f64 / (now - started).as_secs_f64(),
                    recent_rps: (completed - last_reported_count) as f64
                        / (now - last_reported_at).as_secs_f64(),
                });
                last_reported_at = now;
                last_reported_count = completed;
            }
        }

        let elapsed = started.elapsed();
        let summary = RunSummary {
            completed_requests: completed,
            elapsed,
            overall_rps: completed as f64 / elapsed.as_secs_f64(),
            write_gate_available: self.store.write_gate().available(),
        };
        self.sink.summary(&summary);
        Ok(summary)
    }

    /// Waits for every write-back scheduled so far to finish.
    ///
    /// The loop never calls this; tests do, to observe a settled unit
    /// directory. Exiting without draining lets started write-backs finish
    /// with the runtime and discards queued ones.
    pub async fn drain_write_backs(&mut self) {
        while let Some(joined) = self.write_backs.join_next().await {
            joined.expect("write-back task panicked");
        }
    }
}

/// One logical request: all read workers in parallel on the blocking pool.
///
/// Workers are never cancelled. The group runs to completion and the first
/// error, if any, is reported afterwards.
async fn read_request(
    store: Arc<dyn UnitStore>,
    sink: Arc<dyn MetricsSink>,
    num_workers: usize,
) -> Result<(), StoreError> {
    let mut workers: JoinSet<Result<(), StoreError>> = JoinSet::new();
    for worker_id in 0..num_workers {
        let store = Arc::clone(&store);
        let sink = Arc::clone(&sink);
        workers.spawn_blocking(move || {
            let started = Instant::now();
            store.read_unit(worker_id)?;
            sink.read_latency(worker_id, started.elapsed());
            Ok(())
        });
    }
    let mut result = Ok(());
    while let Some(joined) = workers.join_next().await {
        let worker_result = joined.expect("read worker panicked");
        if result.is_ok() {
            result = worker_result;
        }
    }
    result
}
