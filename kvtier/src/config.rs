use std::num::{NonZeroU64, NonZeroUsize};
use std::path::PathBuf;

use crate::stores::StoreKind;

/// Benchmark configuration consumed by [`Driver`](crate::Driver) and the
/// store constructors.
///
/// Strictly-positive options are `NonZero*` so that a zero value is
/// unrepresentable rather than checked at runtime. A missing
/// `rate_limit_bytes_per_second` disables bandwidth limiting entirely.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on logical requests in flight at once.
    pub max_inflight_requests: NonZeroUsize,
    /// Capacity of the write gate, i.e. write-backs admitted concurrently.
    pub max_write_waiters: NonZeroUsize,
    /// Parallel storage operations per logical request (and per write-back
    /// round).
    pub num_workers_per_single_request: NonZeroUsize,
    /// Directory holding the storage units.
    pub base_path: PathBuf,
    /// Number of storage units (files, or blocks of the shared backing
    /// file).
    pub num_files: NonZeroUsize,
    /// Size of every storage unit in bytes. Each operation transfers exactly
    /// this many bytes.
    pub file_size: NonZeroU64,
    /// The run finishes once this many logical requests completed.
    pub requests_to_complete: NonZeroU64,
    /// Shared read+write bandwidth cap; `None` means unlimited.
    pub rate_limit_bytes_per_second: Option<NonZeroU64>,
    /// Which store implementation to exercise.
    pub storage_manager_variant: StoreKind,
    /// `true` wipes and recreates `base_path`; `false` keeps it and resumes
    /// from the units found there.
    pub recreate_dir: bool,
}

impl Config {
    /// Number of storage operations that can run at the same instant: every
    /// in-flight request and every admitted write-back round may execute
    /// `num_workers_per_single_request` transfers in parallel.
    ///
    /// Sizes the descriptor pool of the pooled-descriptor store; callers use
    /// it to size the blocking thread pool as well.
    pub fn max_concurrent_transfers(&self) -> usize {
        (self.max_inflight_requests.get() + self.max_write_waiters.get())
            * self.num_workers_per_single_request.get()
    }
}
