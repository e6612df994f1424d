use std::collections::HashSet;
use std::num::{NonZeroU64, NonZeroUsize};
use std::os::fd::AsRawFd;
use std::path::Path;

use super::pooled_descriptor::PooledDescriptorStore;
use super::*;

const UNIT_SIZE: u64 = 32;

fn test_config(base_path: &Path, variant: StoreKind, num_files: usize) -> Config {
    Config {
        max_inflight_requests: NonZeroUsize::new(2).unwrap(),
        max_write_waiters: NonZeroUsize::new(2).unwrap(),
        num_workers_per_single_request: NonZeroUsize::new(2).unwrap(),
        base_path: base_path.to_owned(),
        num_files: NonZeroUsize::new(num_files).unwrap(),
        file_size: NonZeroU64::new(UNIT_SIZE).unwrap(),
        requests_to_complete: NonZeroU64::new(1).unwrap(),
        rate_limit_bytes_per_second: None,
        storage_manager_variant: variant,
        recreate_dir: true,
    }
}

fn unit_names(base_path: &Path) -> HashSet<String> {
    std::fs::read_dir(base_path)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect()
}

#[test]
fn create_lays_out_sequentially_named_full_size_units() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), StoreKind::PerFileReopen, 4);
    open_store(&config).unwrap();
    let names = unit_names(dir.path());
    assert_eq!(
        names,
        HashSet::from(["f0", "f1", "f2", "f3"].map(String::from))
    );
    for name in &names {
        assert_eq!(
            std::fs::metadata(dir.path().join(name)).unwrap().len(),
            UNIT_SIZE
        );
    }
}

#[test]
fn eviction_replaces_exactly_one_unit() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), StoreKind::PerFileReopen, 4);
    let store = open_store(&config).unwrap();
    let before = unit_names(dir.path());
    store.write_unit(0, true).unwrap();
    let after = unit_names(dir.path());
    assert_eq!(after.len(), 4);
    assert!(after.contains("f4"));
    assert_eq!(before.difference(&after).count(), 1);
    assert_eq!(before.intersection(&after).count(), 3);
}

#[test]
fn no_eviction_write_preserves_the_name_set() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), StoreKind::NoEviction, 4);
    let store = open_store(&config).unwrap();
    let before = unit_names(dir.path());
    // the evict flag is ignored by this variant
    for _ in 0..6 {
        store.write_unit(0, true).unwrap();
    }
    assert_eq!(unit_names(dir.path()), before);
    for name in &before {
        assert_eq!(
            std::fs::metadata(dir.path().join(name)).unwrap().len(),
            UNIT_SIZE
        );
    }
}

#[test]
fn cached_handle_store_works_on_preexisting_units() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..3 {
        std::fs::write(
            dir.path().join(format!("f{i}")),
            vec![7u8; UNIT_SIZE as usize],
        )
        .unwrap();
    }
    let mut config = test_config(dir.path(), StoreKind::NoEvictionNoReopen, 3);
    config.recreate_dir = false;
    let store = open_store(&config).unwrap();
    let before = unit_names(dir.path());
    for worker_id in 0..4 {
        store.read_unit(worker_id).unwrap();
        store.write_unit(worker_id, true).unwrap();
    }
    assert_eq!(unit_names(dir.path()), before);
}

#[test]
fn cached_handle_write_rewrites_the_unit_in_place() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("f0"), vec![7u8; UNIT_SIZE as usize]).unwrap();
    let mut config = test_config(dir.path(), StoreKind::NoEvictionNoReopen, 1);
    config.recreate_dir = false;
    let store = open_store(&config).unwrap();
    store.write_unit(0, true).unwrap();
    assert_eq!(
        std::fs::read(dir.path().join("f0")).unwrap(),
        vec![0u8; UNIT_SIZE as usize]
    );
    store.read_unit(0).unwrap();
}

#[test]
fn scan_resumes_id_allocation_after_the_highest_unit() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10 {
        std::fs::write(
            dir.path().join(format!("f{i}")),
            vec![0u8; UNIT_SIZE as usize],
        )
        .unwrap();
    }
    let mut config = test_config(dir.path(), StoreKind::PerFileReopen, 10);
    config.recreate_dir = false;
    let store = open_store(&config).unwrap();
    store.write_unit(0, true).unwrap();
    let names = unit_names(dir.path());
    assert_eq!(names.len(), 10);
    assert!(names.contains("f10"), "next unit must be f10, got {names:?}");
}

#[test]
fn scan_rejects_entries_not_named_like_units() {
    for bad in ["readme.txt", "f", "f+3", "g0"] {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f0"), [0u8; UNIT_SIZE as usize]).unwrap();
        std::fs::write(dir.path().join(bad), b"x").unwrap();
        let mut config = test_config(dir.path(), StoreKind::PerFileReopen, 2);
        config.recreate_dir = false;
        match open_store(&config).map(|_| ()) {
            Err(StoreError::InvalidUnitName { name, .. }) => assert_eq!(name, *bad),
            Err(other) => panic!("expected InvalidUnitName for {bad:?}, got {other:?}"),
            Ok(()) => panic!("scan must fail for {bad:?}"),
        }
    }
}

#[test]
fn scan_rejects_more_units_than_the_pool_holds() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..3 {
        std::fs::write(dir.path().join(format!("f{i}")), b"x").unwrap();
    }
    let mut config = test_config(dir.path(), StoreKind::PerFileReopen, 2);
    config.recreate_dir = false;
    match open_store(&config).map(|_| ()) {
        Err(StoreError::Pool(PoolError::CapacityExceeded { capacity: 2 })) => {}
        Err(other) => panic!("expected CapacityExceeded, got {other:?}"),
        Ok(()) => panic!("scan must fail"),
    }
}

#[test]
fn pooled_descriptor_store_sizes_the_backing_file_by_unit_count() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), StoreKind::PooledDescriptor, 8);
    let store = open_store(&config).unwrap();
    assert_eq!(unit_names(dir.path()), HashSet::from(["kvc2".to_string()]));
    let backing = dir.path().join("kvc2");
    assert_eq!(std::fs::metadata(&backing).unwrap().len(), 8 * UNIT_SIZE);
    store.read_unit(0).unwrap();
    store.write_unit(0, true).unwrap();
    assert_eq!(std::fs::metadata(&backing).unwrap().len(), 8 * UNIT_SIZE);
}

#[test]
fn descriptor_pool_hands_out_distinct_descriptors_until_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), StoreKind::PooledDescriptor, 2);
    let store = PooledDescriptorStore::open(&config).unwrap();
    // (2 in-flight + 2 write waiters) * 2 workers = 8 descriptors
    let mut checked_out = Vec::new();
    let mut raw_fds = HashSet::new();
    for _ in 0..config.max_concurrent_transfers() {
        let descriptor = store.take_descriptor().unwrap();
        assert!(
            raw_fds.insert(descriptor.as_raw_fd()),
            "descriptor handed out twice"
        );
        checked_out.push(descriptor);
    }
    assert!(matches!(
        store.take_descriptor(),
        Err(StoreError::DescriptorPoolEmpty)
    ));
    for descriptor in checked_out {
        store.put_descriptor(descriptor);
    }
    store.read_unit(0).unwrap();
}

#[test]
fn concurrent_reads_and_write_backs_keep_unit_accounting_intact() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path(), StoreKind::PerFileReopen, 8);
    let store = open_store(&config).unwrap();
    std::thread::scope(|scope| {
        for worker_id in 0..4 {
            let store = &store;
            scope.spawn(move || {
                for _ in 0..25 {
                    store.read_unit(worker_id).unwrap();
                    store.write_unit(worker_id, true).unwrap();
                }
            });
        }
    });
    let names = unit_names(dir.path());
    assert_eq!(names.len(), 8);
    // 8 initial units, then 100 evicting writes allocate f8 through f107
    let ids: HashSet<u64> = names
        .iter()
        .map(|name| name.strip_prefix('f').unwrap().parse().unwrap())
        .collect();
    assert_eq!(ids.len(), 8);
    assert_eq!(ids.iter().max(), Some(&107));
}
