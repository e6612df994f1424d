//! Concurrency and storage engine for a synthetic KV-cache storage tier benchmark.
//!
//! The engine models the storage tier of a key-value cache: logical requests
//! arrive at a [`Driver`], each request fans out into a fixed number of
//! parallel reads against a pool of fixed-size storage units, and every
//! completed request schedules fire-and-forget write-backs that evict and
//! recreate (or overwrite) units. Write-side backpressure is applied through
//! a [`WriteGate`], and an optional [`RateLimiter`] caps the bytes moved per
//! wall-clock second.
//!
//! # Usage
//!
//! 1. Build a [`Config`] describing concurrency limits, the unit pool, and
//!    which [`StoreKind`] to exercise.
//! 2. Implement [`MetricsSink`] to receive progress, latency, and summary
//!    callbacks (all methods default to no-ops).
//! 3. Construct a [`Driver`] and await [`Driver::run`] on a tokio runtime.
//!    Storage operations are blocking and run on the runtime's blocking
//!    thread pool, so size it for the configured concurrency.
//!
//! ```no_run
//! use std::num::{NonZeroU64, NonZeroUsize};
//! use std::sync::Arc;
//!
//! struct Quiet;
//! impl kvtier::MetricsSink for Quiet {}
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = kvtier::Config {
//!         max_inflight_requests: NonZeroUsize::new(64).unwrap(),
//!         max_write_waiters: NonZeroUsize::new(64).unwrap(),
//!         num_workers_per_single_request: NonZeroUsize::new(8).unwrap(),
//!         base_path: "/tmp/kvtier-bench".into(),
//!         num_files: NonZeroUsize::new(1000).unwrap(),
//!         file_size: NonZeroU64::new(128 * 1024).unwrap(),
//!         requests_to_complete: NonZeroU64::new(10_000).unwrap(),
//!         rate_limit_bytes_per_second: None,
//!         storage_manager_variant: kvtier::StoreKind::PerFileReopen,
//!         recreate_dir: true,
//!     };
//!     let mut driver = kvtier::Driver::new(config, Arc::new(Quiet)).unwrap();
//!     let summary = driver.run().await.unwrap();
//!     println!(
//!         "{} requests in {:?}",
//!         summary.completed_requests, summary.elapsed
//!     );
//! }
//! ```

mod config;
pub mod driver;
mod gate;
mod limiter;
mod pool;
pub mod stores;

pub use config::Config;
pub use driver::{Driver, MetricsSink, Progress, RunSummary};
pub use gate::{WriteGate, WritePermit};
pub use limiter::{Direction, RateLimiter};
pub use pool::{PoolError, RandomEvictionPool};
pub use stores::{open_store, StoreError, StoreKind, UnitStore, UnknownStoreKind};
