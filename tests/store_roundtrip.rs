use devattest::primitive::KeyId;
use devattest::store::{KeyRecord, KeyStore, slot::RECORD_FILE};

fn record(id: &str, count: u64) -> KeyRecord {
    KeyRecord { id: KeyId::new(id), count }
}

#[test]
fn test_store_roundtrip() {
    let dir = tempfile::tempdir().unwrap();

    {
        let mut store = KeyStore::open(dir.path()).unwrap();
        assert!(store.load().is_none());
        store.save(record("abc123", 0)).unwrap();
    }

    // Reopen, as after a process restart
    let store = KeyStore::open(dir.path()).unwrap();
    assert_eq!(store.load(), Some(record("abc123", 0)));
}

#[test]
fn test_store_on_disk_format() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = KeyStore::open(dir.path()).unwrap();
    store.save(record("abc123", 7)).unwrap();

    let raw = std::fs::read(dir.path().join(RECORD_FILE)).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert_eq!(json, serde_json::json!({"id": "abc123", "count": 7}));
}

#[test]
fn test_store_save_replaces() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = KeyStore::open(dir.path()).unwrap();
    store.save(record("abc123", 2)).unwrap();
    store.save(record("abc123", 7)).unwrap();
    assert_eq!(store.load(), Some(record("abc123", 7)));

    let reopened = KeyStore::open(dir.path()).unwrap();
    assert_eq!(reopened.load(), Some(record("abc123", 7)));

    // Only the record file remains; temp files are renamed away.
    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, vec![std::ffi::OsString::from(RECORD_FILE)]);
}

#[test]
fn test_store_clear() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = KeyStore::open(dir.path()).unwrap();
    store.save(record("abc123", 3)).unwrap();

    store.clear().unwrap();
    assert!(store.load().is_none());
    assert!(!dir.path().join(RECORD_FILE).exists());

    // Clearing an empty store is fine
    store.clear().unwrap();
    assert!(store.load().is_none());

    let reopened = KeyStore::open(dir.path()).unwrap();
    assert!(reopened.load().is_none());
}

#[test]
fn test_store_corrupt_file_treated_as_absent() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(RECORD_FILE), b"{not json").unwrap();

    let mut store = KeyStore::open(dir.path()).unwrap();
    assert!(store.load().is_none(), "corrupt record must be ignored");

    // And can be overwritten by a fresh enrollment
    store.save(record("fresh", 0)).unwrap();
    let reopened = KeyStore::open(dir.path()).unwrap();
    assert_eq!(reopened.load(), Some(record("fresh", 0)));
}

#[test]
fn test_store_rejects_negative_count() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join(RECORD_FILE),
        br#"{"id":"abc123","count":-1}"#,
    )
    .unwrap();
    let store = KeyStore::open(dir.path()).unwrap();
    assert!(store.load().is_none());
}

#[test]
fn test_store_creates_missing_dir() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let mut store = KeyStore::open(&nested).unwrap();
    store.save(record("abc123", 1)).unwrap();
    assert!(nested.join(RECORD_FILE).exists());
}
