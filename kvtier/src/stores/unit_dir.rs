//! Pool and naming state shared by the per-file store variants.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::pool::RandomEvictionPool;

use super::StoreError;

/// A directory of unit files named `f<id>` plus the monotonically
/// increasing id counter.
///
/// One lock covers both, matching the checkout discipline: a path popped
/// from the pool is owned exclusively by its caller until added back, so no
/// lock is held across the I/O done on it.
pub(super) struct UnitDir {
    base_path: PathBuf,
    state: Mutex<DirState>,
}

struct DirState {
    units: RandomEvictionPool<PathBuf>,
    next_id: u64,
}

impl UnitDir {
    /// Creates `num_files` fresh units `f0` through `f<num_files - 1>`, each
    /// a full copy of `write_buf`. Setup writes are not benchmark traffic
    /// and do not charge the rate limiter.
    pub(super) fn create(
        base_path: &Path,
        num_files: usize,
        write_buf: &[u8],
    ) -> Result<Self, StoreError> {
        let this = Self {
            base_path: base_path.to_owned(),
            state: Mutex::new(DirState {
                units: RandomEvictionPool::new(num_files),
                next_id: 0,
            }),
        };
        for _ in 0..num_files {
            let path = this.next_unit_path();
            std::fs::write(&path, write_buf)?;
            this.add(path)?;
        }
        Ok(this)
    }

    /// Picks up the units already present in `base_path` and resumes id
    /// allocation after the highest id found.
    ///
    /// Every directory entry must be named `f<id>`; anything else fails the
    /// scan. More entries than `num_files` fail it too.
    pub(super) fn scan(base_path: &Path, num_files: usize) -> Result<Self, StoreError> {
        let mut units = RandomEvictionPool::new(num_files);
        let mut max_id = None;
        for entry in std::fs::read_dir(base_path)? {
            let entry = entry?;
            let name = entry.file_name();
            let id = name
                .to_str()
                .and_then(|name| name.strip_prefix('f'))
                .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|id| id.parse::<u64>().ok())
                .ok_or_else(|| StoreError::InvalidUnitName {
                    dir: base_path.to_owned(),
                    name: name.clone(),
                })?;
            max_id = max_id.max(Some(id));
            units.add(entry.path())?;
        }
        Ok(Self {
            base_path: base_path.to_owned(),
            state: Mutex::new(DirState {
                units,
                next_id: max_id.map_or(0, |id| id + 1),
            }),
        })
    }

    /// Removes a random unit from the pool. The caller owns it exclusively
    /// until it is [`add`](Self::add)ed back.
    pub(super) fn pop_random(&self) -> Result<PathBuf, StoreError> {
        Ok(self.state.lock().unwrap().units.pop_random()?)
    }

    pub(super) fn add(&self, path: PathBuf) -> Result<(), StoreError> {
        Ok(self.state.lock().unwrap().units.add(path)?)
    }

    /// Allocates the name of the next unit, `f<next_id>`.
    pub(super) fn next_unit_path(&self) -> PathBuf {
        let mut state = self.state.lock().unwrap();
        let path = self.base_path.join(format!("f{}", state.next_id));
        state.next_id += 1;
        path
    }

    /// Snapshot of the currently pooled unit paths. Units checked out by
    /// concurrent callers are not included.
    pub(super) fn pooled_units(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().units.iter().cloned().collect()
    }
}
