use std::fs::File;
use std::sync::Arc;

use memtable::{KeyValue, Table};
use tempfile::tempdir;

use crate::reader::MetaTable;
use crate::writer::dump_table;
use crate::TABLE_ALIGN;

fn sample_table() -> Table {
    let mut t = Table::new();
    for i in 0..2_000u32 {
        let key = format!("wk-{i:05}").into_bytes();
        let value = format!("wv-{i}").into_bytes();
        t.insert(&KeyValue::new(key, value));
    }
    t.build_bloomtable();
    assert!(t.retain());
    t
}

#[test]
fn dump_writes_header_and_barrel_pages() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("data.bin");
    let data_file = File::create(&data_path).unwrap();
    data_file.set_len(TABLE_ALIGN).unwrap();

    let table = sample_table();
    let header = dump_table(dir.path(), &data_file, 0, 1, &table, true).unwrap();
    assert_eq!(header.off, 0);
    assert_eq!(header.volume, table.volume());
    assert_eq!(header.nr_mi, table.metaindex().len() as u64);

    let meta_path = crate::mtid_path(dir.path(), 1);
    assert!(meta_path.exists());
}

#[test]
fn dump_without_embedded_bloomtable_loads_with_none() {
    let dir = tempdir().unwrap();
    let data_path = dir.path().join("data.bin");
    let data_file = File::create(&data_path).unwrap();
    data_file.set_len(TABLE_ALIGN).unwrap();

    let table = sample_table();
    dump_table(dir.path(), &data_file, 0, 7, &table, false).unwrap();

    let data_file = Arc::new(File::open(&data_path).unwrap());
    let mt = MetaTable::load(dir.path(), 7, data_file, true).unwrap();
    assert!(mt.bloomtable().is_none());
}
