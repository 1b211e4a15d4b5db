use super::helpers::open_test_db;
use memtable::KeyValue;

#[test]
fn insert_and_lookup() {
    let t = open_test_db();
    assert!(t.db.insert(KeyValue::new(b"name".to_vec(), b"alice".to_vec())));
    let found = t.db.lookup(b"name").unwrap().unwrap();
    assert_eq!(found.value, b"alice");
}

#[test]
fn lookup_missing_key() {
    let t = open_test_db();
    assert!(t.db.lookup(b"nope").unwrap().is_none());
}

#[test]
fn overwrite_key() {
    let t = open_test_db();
    t.db.insert(KeyValue::new(b"k".to_vec(), b"a".to_vec()));
    t.db.insert(KeyValue::new(b"k".to_vec(), b"b".to_vec()));
    assert_eq!(t.db.lookup(b"k").unwrap().unwrap().value, b"b");
}

#[test]
fn multi_insert_all_visible() {
    let t = open_test_db();
    let kvs: Vec<KeyValue> = (0..200)
        .map(|i| KeyValue::new(format!("key-{i:04}").into_bytes(), format!("v{i}").into_bytes()))
        .collect();
    assert!(t.db.multi_insert(kvs));
    for i in 0..200 {
        let key = format!("key-{i:04}").into_bytes();
        let expected = format!("v{i}").into_bytes();
        assert_eq!(t.db.lookup(&key).unwrap().unwrap().value, expected);
    }
}

#[test]
fn insert_enough_to_trigger_a_seal() {
    let t = open_test_db();
    // Big values push the active table past TABLE_VOLUME_PERCENT quickly
    // without needing hundreds of thousands of inserts, forcing the dumper
    // to seal at least once while this test runs.
    let value = vec![b'x'; 4096];
    for i in 0..9000u32 {
        let key = format!("seal-key-{i:06}").into_bytes();
        assert!(t.db.insert(KeyValue::new(key, value.clone())));
    }
    for _ in 0..100 {
        if t.db.root_table_count() > 0 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
    assert!(t.db.root_table_count() > 0, "dumper should have sealed at least one table");
    t.db.force_dump_meta();
    for i in 0..9000u32 {
        let key = format!("seal-key-{i:06}").into_bytes();
        assert_eq!(t.db.lookup(&key).unwrap().unwrap().value, value);
    }
}
