use std::{
    collections::HashMap,
    num::{NonZeroU64, NonZeroUsize},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use clap::Parser;
use crossbeam_utils::CachePadded;
use hdrhistogram::Counter;
use itertools::Itertools;
use kvtier::{Config, Driver, MetricsSink, Progress, RunSummary, StoreKind};
use serde_with::serde_as;
use tracing::info;

#[serde_as]
#[derive(serde::Serialize, clap::Parser, Clone)]
struct Args {
    /// Upper bound on logical read requests in flight at once.
    #[clap(long)]
    max_inflight_requests: NonZeroUsize,
    /// How many write-backs may hold a write slot concurrently.
    #[clap(long)]
    max_write_waiters: NonZeroUsize,
    /// Parallel storage transfers per logical request.
    #[clap(long)]
    num_workers_per_single_request: NonZeroUsize,
    /// Directory holding the storage units.
    #[clap(long)]
    base_path: PathBuf,
    /// Number of storage units to provision.
    #[clap(long)]
    num_files: NonZeroUsize,
    /// Size of each storage unit in bytes.
    #[clap(long)]
    file_size: NonZeroU64,
    /// Stop after this many completed read requests.
    #[clap(long)]
    requests_to_complete: NonZeroU64,
    /// Shared read+write bandwidth cap in bytes per second, 0 disables it.
    #[clap(long)]
    rate_limit_bytes_per_second: u64,
    /// One of pooled-descriptor, per-file-reopen, no-eviction,
    /// no-eviction-no-reopen.
    #[clap(long)]
    #[serde_as(as = "serde_with::DisplayFromStr")]
    storage_manager_variant: StoreKind,
    /// Wipe and re-provision base-path before the run; pass false to reuse
    /// the units already there.
    #[clap(long, action = clap::ArgAction::Set)]
    recreate_dir: bool,
    /// Write a JSON results file to this path when the run completes.
    #[clap(long)]
    output_json: Option<PathBuf>,
}

const LATENCY_PERCENTILES: [f64; 7] = [50.0, 90.0, 99.0, 99.9, 99.99, 99.999, 99.9999];

fn latency_percentiles_serialize<S>(
    values: &[f64; LATENCY_PERCENTILES.len()],
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serde::Serialize::serialize(
        &LATENCY_PERCENTILES
            .iter()
            .map(|p| format!("p{p}"))
            .zip(values.iter().cloned())
            .collect::<HashMap<_, _>>(),
        serializer,
    )
}

#[derive(serde::Serialize)]
struct LatencySummary {
    latency_min_us: f64,
    latency_mean_us: f64,
    latency_max_us: f64,
    #[serde(serialize_with = "latency_percentiles_serialize")]
    latency_percentiles: [f64; LATENCY_PERCENTILES.len()],
}

impl LatencySummary {
    fn from_histogram(histo: &hdrhistogram::Histogram<u64>) -> Self {
        Self {
            latency_min_us: histo.min().as_f64() / 1000.0,
            latency_mean_us: histo.mean() / 1000.0,
            latency_max_us: histo.max().as_f64() / 1000.0,
            latency_percentiles: {
                let mut values = [0.0; LATENCY_PERCENTILES.len()];
                for (i, value_ref) in values.iter_mut().enumerate() {
                    *value_ref =
                        histo.value_at_percentile(LATENCY_PERCENTILES[i]).as_f64() / 1000.0;
                }
                values
            },
        }
    }
}

impl std::fmt::Display for LatencySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "LAT(us): min={:.0} mean={:.0} max={:.0} {}",
            self.latency_min_us,
            self.latency_mean_us,
            self.latency_max_us,
            self.latency_percentiles
                .iter()
                .zip(LATENCY_PERCENTILES.iter())
                .map(|(v, p)| format!("p{p}={v:.0}"))
                .join(" "),
        )
    }
}

/// Aggregates per-worker read latencies and renders progress and summary
/// lines at the `info` level.
struct LogSink {
    latencies_histo: Vec<CachePadded<Mutex<hdrhistogram::Histogram<u64>>>>,
}

impl LogSink {
    fn new(num_workers: usize) -> Self {
        Self {
            latencies_histo: (0..num_workers)
                .map(|_| CachePadded::new(Mutex::new(Self::make_latency_histogram())))
                .collect(),
        }
    }

    fn make_latency_histogram() -> hdrhistogram::Histogram<u64> {
        hdrhistogram::Histogram::new_with_bounds(1, 1_000_000_000, 3).unwrap()
    }

    fn merged_latencies(&self) -> hdrhistogram::Histogram<u64> {
        let mut merged = Self::make_latency_histogram();
        for histo in &self.latencies_histo {
            merged += &*histo.lock().unwrap();
        }
        merged
    }
}

impl MetricsSink for LogSink {
    fn read_latency(&self, worker_id: usize, latency: Duration) {
        let mut histo = self.latencies_histo[worker_id].lock().unwrap();
        // rate-limited reads can stall past the histogram's trackable range
        histo.saturating_record(u64::try_from(latency.as_nanos()).unwrap());
    }

    fn progress(&self, progress: &Progress) {
        info!(
            "Completed {} requests | Total BW: {:.2} req/s | Recent BW: {:.2} req/s",
            progress.completed_requests, progress.overall_rps, progress.recent_rps
        );
    }

    fn summary(&self, summary: &RunSummary) {
        info!("Benchmark completed!");
        info!("Total requests: {}", summary.completed_requests);
        info!("Total time: {:.2} seconds", summary.elapsed.as_secs_f64());
        info!("Overall BW: {:.2} req/s", summary.overall_rps);
        info!(
            "Final write gate availability: {}",
            summary.write_gate_available
        );
        let merged = self.merged_latencies();
        if !merged.is_empty() {
            info!("read {}", LatencySummary::from_histogram(&merged));
        }
    }
}

#[serde_as]
#[derive(serde::Serialize)]
struct BenchmarkOutput {
    args: Args,
    completed_requests: u64,
    #[serde_as(as = "serde_with::DurationMicroSeconds")]
    elapsed_us: Duration,
    overall_bw_rps: f64,
    write_gate_available: usize,
    read_latency: LatencySummary,
}

fn print_config(config: &Config) {
    info!("Starting benchmark with configuration:");
    info!("  max inflight requests:    {}", config.max_inflight_requests);
    info!("  max write waiters:        {}", config.max_write_waiters);
    info!(
        "  workers per request:      {}",
        config.num_workers_per_single_request
    );
    info!("  base path:                {}", config.base_path.display());
    info!("  number of files:          {}", config.num_files);
    info!(
        "  file size:                {} bytes ({:.2} MiB)",
        config.file_size,
        config.file_size.get() as f64 / ((1 << 20) as f64)
    );
    info!("  requests to complete:     {}", config.requests_to_complete);
    match config.rate_limit_bytes_per_second {
        Some(limit) => info!(
            "  rate limit:               {} bytes/sec ({:.2} GiB/sec)",
            limit,
            limit.get() as f64 / ((1 << 30) as f64)
        ),
        None => info!("  rate limit:               unlimited"),
    }
    info!(
        "  storage manager variant:  {}",
        config.storage_manager_variant
    );
    info!("  recreate dir:             {}", config.recreate_dir);
}

fn main() {
    tracing_subscriber::fmt()
        .with_file(true)
        .with_line_number(true)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = Config {
        max_inflight_requests: args.max_inflight_requests,
        max_write_waiters: args.max_write_waiters,
        num_workers_per_single_request: args.num_workers_per_single_request,
        base_path: args.base_path.clone(),
        num_files: args.num_files,
        file_size: args.file_size,
        requests_to_complete: args.requests_to_complete,
        rate_limit_bytes_per_second: NonZeroU64::new(args.rate_limit_bytes_per_second),
        storage_manager_variant: args.storage_manager_variant,
        recreate_dir: args.recreate_dir,
    };

    print_config(&config);

    // every admitted request and write-back does its transfers on the
    // blocking pool; size it so none of them queue behind each other
    let max_blocking_threads = config.max_concurrent_transfers() + 16;

    let sink = Arc::new(LogSink::new(config.num_workers_per_single_request.get()));

    let mut driver = Driver::new(config, Arc::clone(&sink) as Arc<dyn MetricsSink>).unwrap();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .max_blocking_threads(max_blocking_threads)
        .enable_all()
        .build()
        .unwrap();

    let summary = rt.block_on(driver.run()).unwrap();

    if let Some(outpath) = &args.output_json {
        let output = BenchmarkOutput {
            args: args.clone(),
            completed_requests: summary.completed_requests,
            elapsed_us: summary.elapsed,
            overall_bw_rps: summary.overall_rps,
            write_gate_available: summary.write_gate_available,
            read_latency: LatencySummary::from_histogram(&sink.merged_latencies()),
        };
        info!("writing results to {:?}", outpath);
        std::fs::write(outpath, serde_json::to_string(&output).unwrap()).unwrap();
    }
}
