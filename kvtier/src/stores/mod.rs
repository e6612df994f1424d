//! The storage-unit access layer.
//!
//! A store owns a pool of fixed-size storage units and serves two
//! operations: read one unit chosen at random, and write one unit back
//! (evicting a random victim or overwriting in place, depending on the
//! variant). All variants share the write gate, the optional rate limiter,
//! and a single zeroed write buffer.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use tracing::debug;

use crate::config::Config;
use crate::gate::WriteGate;
use crate::limiter::{Direction, RateLimiter};
use crate::pool::PoolError;

mod no_eviction;
mod no_eviction_no_reopen;
mod per_file_reopen;
mod pooled_descriptor;
mod unit_dir;

#[cfg(test)]
mod tests;

use no_eviction::NoEvictionStore;
use no_eviction_no_reopen::NoEvictionNoReopenStore;
use per_file_reopen::PerFileReopenStore;
use pooled_descriptor::PooledDescriptorStore;

/// A pool of fixed-size storage units plus the gate guarding its write path.
///
/// Implementations are safe for concurrent use from many blocking worker
/// threads. Every operation transfers exactly one unit worth of bytes and
/// consults the rate limiter after acquiring its resources, right before the
/// transfer.
pub trait UnitStore: Send + Sync {
    /// Writes one full unit. With `evict` set, variants that evict drop a
    /// random unit and create a fresh one in its place; the others overwrite
    /// an existing unit. Waits for a write gate slot first.
    fn write_unit(&self, worker_id: usize, evict: bool) -> Result<(), StoreError>;

    /// Reads one full unit chosen uniformly at random.
    fn read_unit(&self, worker_id: usize) -> Result<(), StoreError>;

    /// The gate bounding concurrent write-backs. The admission loop probes
    /// it before spawning a request.
    fn write_gate(&self) -> &WriteGate;
}

/// Which store implementation a run exercises. Parses from the exact
/// command-line tokens and prints back as them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    PooledDescriptor,
    PerFileReopen,
    NoEviction,
    NoEvictionNoReopen,
}

#[derive(Debug, thiserror::Error)]
#[error(
    "unknown storage manager variant {0:?}, expected one of \
     pooled-descriptor, per-file-reopen, no-eviction, no-eviction-no-reopen"
)]
pub struct UnknownStoreKind(pub String);

impl FromStr for StoreKind {
    type Err = UnknownStoreKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pooled-descriptor" => Ok(StoreKind::PooledDescriptor),
            "per-file-reopen" => Ok(StoreKind::PerFileReopen),
            "no-eviction" => Ok(StoreKind::NoEviction),
            "no-eviction-no-reopen" => Ok(StoreKind::NoEvictionNoReopen),
            other => Err(UnknownStoreKind(other.to_owned())),
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StoreKind::PooledDescriptor => "pooled-descriptor",
            StoreKind::PerFileReopen => "per-file-reopen",
            StoreKind::NoEviction => "no-eviction",
            StoreKind::NoEvictionNoReopen => "no-eviction-no-reopen",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage i/o: {0}")]
    Io(#[from] io::Error),
    #[error("unit pool: {0}")]
    Pool(#[from] PoolError),
    #[error("unit directory {dir:?} holds entry {name:?}, which is not of the form f<id>")]
    InvalidUnitName { dir: PathBuf, name: OsString },
    #[error("descriptor pool is empty")]
    DescriptorPoolEmpty,
}

/// Builds the store variant selected by `config.storage_manager_variant`.
///
/// Provisions `config.base_path` first: with `recreate_dir` the directory is
/// wiped and recreated, otherwise it is created if missing and the units
/// found inside are picked up.
pub fn open_store(config: &Config) -> Result<Arc<dyn UnitStore>, StoreError> {
    prepare_base_dir(&config.base_path, config.recreate_dir)?;
    debug!(
        variant = %config.storage_manager_variant,
        base_path = ?config.base_path,
        "opening store"
    );
    let store: Arc<dyn UnitStore> = match config.storage_manager_variant {
        StoreKind::PooledDescriptor => Arc::new(PooledDescriptorStore::open(config)?),
        StoreKind::PerFileReopen => Arc::new(PerFileReopenStore::open(config)?),
        StoreKind::NoEviction => Arc::new(NoEvictionStore::open(config)?),
        StoreKind::NoEvictionNoReopen => Arc::new(NoEvictionNoReopenStore::open(config)?),
    };
    Ok(store)
}

fn prepare_base_dir(base_path: &Path, recreate: bool) -> io::Result<()> {
    if recreate {
        match std::fs::remove_dir_all(base_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    std::fs::create_dir_all(base_path)
}

/// State every store variant carries: the unit size, the zeroed source
/// buffer for writes, the optional limiter, and the write gate.
struct StoreShared {
    file_size: u64,
    write_buf: Vec<u8>,
    limiter: Option<RateLimiter>,
    gate: WriteGate,
}

impl StoreShared {
    fn new(config: &Config) -> Self {
        Self {
            file_size: config.file_size.get(),
            write_buf: vec![0u8; config.file_size.get() as usize],
            limiter: config.rate_limit_bytes_per_second.map(RateLimiter::new),
            gate: WriteGate::new(config.max_write_waiters.get()),
        }
    }

    /// Charges the limiter for one full unit transfer, if limiting is on.
    fn allow(&self, direction: Direction) {
        if let Some(limiter) = &self.limiter {
            limiter.await_allowance(self.file_size, direction);
        }
    }
}
