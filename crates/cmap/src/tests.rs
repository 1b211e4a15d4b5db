use tempfile::tempdir;

use crate::{ContainerMap, CONTAINER_UNIT_SIZE};

#[test]
fn alloc_release_round_trip() {
    let dir = tempdir().unwrap();
    let raw_path = dir.path().join("raw.bin");
    let cap = CONTAINER_UNIT_SIZE * 64;
    let cm = ContainerMap::create(&raw_path, cap).unwrap();
    assert_eq!(cm.nr_units(), 64);

    let mut offsets = Vec::new();
    for _ in 0..64 {
        let off = cm.alloc();
        assert!(!cm.is_sentinel(off));
        assert_eq!(off % CONTAINER_UNIT_SIZE, 0);
        offsets.push(off);
    }
    assert_eq!(cm.nr_used(), 64);
    assert!(cm.is_sentinel(cm.alloc()));

    for off in offsets.drain(..32) {
        cm.release(off);
    }
    assert_eq!(cm.nr_used(), 32);
    for _ in 0..32 {
        assert!(!cm.is_sentinel(cm.alloc()));
    }
    assert_eq!(cm.nr_used(), 64);
}

#[test]
fn no_double_allocation() {
    let dir = tempdir().unwrap();
    let raw_path = dir.path().join("raw.bin");
    let cm = ContainerMap::create(&raw_path, CONTAINER_UNIT_SIZE * 32).unwrap();
    let mut seen = std::collections::HashSet::new();
    for _ in 0..32 {
        let off = cm.alloc();
        assert!(seen.insert(off), "offset {off} allocated twice");
    }
}

#[test]
fn dump_and_load_preserves_state() {
    let dir = tempdir().unwrap();
    let raw_path = dir.path().join("raw.bin");
    let meta_path = dir.path().join("raw.meta");
    let cm = ContainerMap::create(&raw_path, CONTAINER_UNIT_SIZE * 16).unwrap();

    let mut offsets = Vec::new();
    for _ in 0..10 {
        offsets.push(cm.alloc());
    }
    cm.dump(&meta_path).unwrap();

    let cm2 = ContainerMap::load(&meta_path, &raw_path).unwrap();
    assert_eq!(cm2.nr_units(), cm.nr_units());
    assert_eq!(cm2.nr_used(), cm.nr_used());
    for off in &offsets {
        cm2.release(*off);
    }
    assert_eq!(cm2.nr_used(), 0);
}

#[test]
fn release_is_idempotent_for_already_free_unit() {
    let dir = tempdir().unwrap();
    let raw_path = dir.path().join("raw.bin");
    let cm = ContainerMap::create(&raw_path, CONTAINER_UNIT_SIZE * 4).unwrap();
    let off = cm.alloc();
    cm.release(off);
    cm.release(off);
    assert_eq!(cm.nr_used(), 0);
}
