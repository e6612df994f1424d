//! Store that opens and closes a unit file around every transfer.

use std::io::Read;

use crate::config::Config;
use crate::gate::WriteGate;
use crate::limiter::Direction;

use super::unit_dir::UnitDir;
use super::{StoreError, StoreShared, UnitStore};

pub(super) struct PerFileReopenStore {
    pub(super) shared: StoreShared,
    pub(super) units: UnitDir,
}

impl PerFileReopenStore {
    pub(super) fn open(config: &Config) -> Result<Self, StoreError> {
        let shared = StoreShared::new(config);
        let units = if config.recreate_dir {
            UnitDir::create(&config.base_path, config.num_files.get(), &shared.write_buf)?
        } else {
            UnitDir::scan(&config.base_path, config.num_files.get())?
        };
        Ok(Self { shared, units })
    }
}

impl UnitStore for PerFileReopenStore {
    fn write_unit(&self, _worker_id: usize, evict: bool) -> Result<(), StoreError> {
        let _permit = self.shared.gate.acquire();
        if evict {
            let victim = self.units.pop_random()?;
            std::fs::remove_file(victim)?;
        }
        let path = self.units.next_unit_path();
        self.shared.allow(Direction::Write);
        std::fs::write(&path, &self.shared.write_buf)?;
        self.units.add(path)?;
        Ok(())
    }

    fn read_unit(&self, _worker_id: usize) -> Result<(), StoreError> {
        let path = self.units.pop_random()?;
        self.shared.allow(Direction::Read);
        let mut buf = vec![0u8; self.shared.file_size as usize];
        {
            let mut file = std::fs::File::open(&path)?;
            file.read_exact(&mut buf)?;
        }
        self.units.add(path)?;
        Ok(())
    }

    fn write_gate(&self) -> &WriteGate {
        &self.shared.gate
    }
}
