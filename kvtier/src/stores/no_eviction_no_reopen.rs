//! Store that opens every unit's handle once at construction and reuses it
//! for all transfers.

use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::gate::WriteGate;
use crate::limiter::Direction;

use super::unit_dir::UnitDir;
use super::{StoreError, StoreShared, UnitStore};

/// Unit set and unit sizes are fixed, so every transfer goes through a
/// cached read+write handle at offset zero. The handle map never changes
/// after construction and is shared without a lock; exclusive use of a unit
/// follows from pool checkout.
pub(super) struct NoEvictionNoReopenStore {
    shared: StoreShared,
    units: UnitDir,
    handles: HashMap<PathBuf, File>,
}

impl NoEvictionNoReopenStore {
    pub(super) fn open(config: &Config) -> Result<Self, StoreError> {
        let shared = StoreShared::new(config);
        let units = if config.recreate_dir {
            UnitDir::create(&config.base_path, config.num_files.get(), &shared.write_buf)?
        } else {
            UnitDir::scan(&config.base_path, config.num_files.get())?
        };
        let mut handles = HashMap::new();
        for path in units.pooled_units() {
            let file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .open(&path)?;
            handles.insert(path, file);
        }
        Ok(Self {
            shared,
            units,
            handles,
        })
    }

    fn handle(&self, path: &Path) -> &File {
        self.handles
            .get(path)
            .expect("every pooled unit got a handle at construction")
    }
}

impl UnitStore for NoEvictionNoReopenStore {
    fn write_unit(&self, _worker_id: usize, _evict: bool) -> Result<(), StoreError> {
        let _permit = self.shared.gate.acquire();
        let path = self.units.pop_random()?;
        self.shared.allow(Direction::Write);
        self.handle(&path).write_all_at(&self.shared.write_buf, 0)?;
        self.units.add(path)?;
        Ok(())
    }

    fn read_unit(&self, _worker_id: usize) -> Result<(), StoreError> {
        let path = self.units.pop_random()?;
        self.shared.allow(Direction::Read);
        let mut buf = vec![0u8; self.shared.file_size as usize];
        self.handle(&path).read_exact_at(&mut buf, 0)?;
        self.units.add(path)?;
        Ok(())
    }

    fn write_gate(&self) -> &WriteGate {
        &self.shared.gate
    }
}
