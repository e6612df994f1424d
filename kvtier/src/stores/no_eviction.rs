//! Store that overwrites units in place; the set of unit names never
//! changes after construction.

use crate::config::Config;
use crate::gate::WriteGate;
use crate::limiter::Direction;

use super::per_file_reopen::PerFileReopenStore;
use super::{StoreError, UnitStore};

/// Same layout and read path as [`PerFileReopenStore`], but writes truncate
/// and rewrite the victim under its existing name instead of deleting it.
pub(super) struct NoEvictionStore(PerFileReopenStore);

impl NoEvictionStore {
    pub(super) fn open(config: &Config) -> Result<Self, StoreError> {
        Ok(Self(PerFileReopenStore::open(config)?))
    }
}

impl UnitStore for NoEvictionStore {
    fn write_unit(&self, _worker_id: usize, _evict: bool) -> Result<(), StoreError> {
        let _permit = self.0.shared.gate.acquire();
        let path = self.0.units.pop_random()?;
        self.0.shared.allow(Direction::Write);
        std::fs::write(&path, &self.0.shared.write_buf)?;
        self.0.units.add(path)?;
        Ok(())
    }

    fn read_unit(&self, worker_id: usize) -> Result<(), StoreError> {
        self.0.read_unit(worker_id)
    }

    fn write_gate(&self) -> &WriteGate {
        self.0.write_gate()
    }
}
