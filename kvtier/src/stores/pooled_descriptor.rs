//! Store backed by a single shared file and a pool of reusable descriptors.

use std::fs::File;
use std::io::Write;
use std::os::unix::fs::FileExt;
use std::sync::Mutex;

use rand::Rng;

use crate::config::Config;
use crate::gate::WriteGate;
use crate::limiter::Direction;

use super::{StoreError, StoreShared, UnitStore};

/// Name of the backing file inside `base_path`.
const BACKING_FILE_NAME: &str = "kvc2";

/// Storage units are `file_size`-sized blocks of one backing file. There is
/// no eviction; reads and writes both land on a fresh random block.
///
/// Descriptors are pre-opened at construction, one per storage operation
/// that can run at the same instant, and checked out non-blockingly: an
/// empty descriptor pool means the concurrency accounting is broken and is
/// reported as [`StoreError::DescriptorPoolEmpty`].
pub(super) struct PooledDescriptorStore {
    shared: StoreShared,
    num_files: usize,
    descriptors: Mutex<Vec<File>>,
}

impl PooledDescriptorStore {
    pub(super) fn open(config: &Config) -> Result<Self, StoreError> {
        let shared = StoreShared::new(config);
        let path = config.base_path.join(BACKING_FILE_NAME);
        // recreated on every run, regardless of config.recreate_dir
        let mut backing = File::create(&path)?;
        for _ in 0..config.num_files.get() {
            backing.write_all(&shared.write_buf)?;
        }
        drop(backing);
        let mut descriptors = Vec::new();
        for _ in 0..config.max_concurrent_transfers() {
            descriptors.push(
                std::fs::OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&path)?,
            );
        }
        Ok(Self {
            shared,
            num_files: config.num_files.get(),
            descriptors: Mutex::new(descriptors),
        })
    }

    pub(super) fn take_descriptor(&self) -> Result<File, StoreError> {
        self.descriptors
            .lock()
            .unwrap()
            .pop()
            .ok_or(StoreError::DescriptorPoolEmpty)
    }

    pub(super) fn put_descriptor(&self, descriptor: File) {
        self.descriptors.lock().unwrap().push(descriptor);
    }

    fn random_unit_offset(&self) -> u64 {
        let block = rand::thread_rng().gen_range(0..self.num_files);
        block as u64 * self.shared.file_size
    }
}

impl UnitStore for PooledDescriptorStore {
    fn write_unit(&self, _worker_id: usize, _evict: bool) -> Result<(), StoreError> {
        let _permit = self.shared.gate.acquire();
        let descriptor = self.take_descriptor()?;
        self.shared.allow(Direction::Write);
        let result = descriptor.write_all_at(&self.shared.write_buf, self.random_unit_offset());
        self.put_descriptor(descriptor);
        Ok(result?)
    }

    fn read_unit(&self, _worker_id: usize) -> Result<(), StoreError> {
        let descriptor = self.take_descriptor()?;
        self.shared.allow(Direction::Read);
        let mut buf = vec![0u8; self.shared.file_size as usize];
        let result = descriptor.read_exact_at(&mut buf, self.random_unit_offset());
        self.put_descriptor(descriptor);
        Ok(result?)
    }

    fn write_gate(&self) -> &WriteGate {
        &self.shared.gate
    }
}
