// Boundary Condition Tests for TinyamoDb
// These tests verify behavior at edge cases and limits

use tempfile::TempDir;
use tinyamodb::record::{HEADER_SIZE, MAX_KEY_SIZE};
use tinyamodb::{Db, Error, Options};

/// Test operations on a completely empty database
#[test]
fn test_empty_database_operations() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path(), Options::default()).unwrap();

    assert_eq!(db.read("nonexistent").unwrap(), None);
    assert_eq!(db.delete("nonexistent").unwrap(), None);
    assert!(db.sync().is_ok());
    assert!(db.close().is_ok());
}

/// Test a single partition database
#[test]
fn test_single_partition() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path(), Options::default().partition_count(1)).unwrap();

    for i in 0..50 {
        let key = format!("solo_{}", i);
        assert_eq!(db.partition_for(&key), 1);
        db.put(&key).unwrap();
    }
    assert_eq!(db.segments(1).unwrap().len(), 1);
}

/// Test a wide database with many partitions
#[test]
fn test_many_partitions() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path(), Options::default().partition_count(64)).unwrap();
    assert_eq!(db.partition_count(), 64);

    db.put("wide").unwrap();
    assert_eq!(db.read("wide").unwrap(), Some("wide".to_string()));
}

/// Test key size limits
#[test]
fn test_maximum_key_size() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path(), Options::default()).unwrap();

    let largest = "k".repeat(MAX_KEY_SIZE);
    assert_eq!(db.put(&largest).unwrap(), None);
    assert_eq!(db.read(&largest).unwrap(), Some(largest.clone()));

    let too_large = "k".repeat(MAX_KEY_SIZE + 1);
    assert!(matches!(db.put(&too_large), Err(Error::InvalidArgument(_))));
}

/// The empty string is an ordinary key
#[test]
fn test_empty_key() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path(), Options::default()).unwrap();

    assert_eq!(db.put("").unwrap(), None);
    assert_eq!(db.read("").unwrap(), Some(String::new()));
    assert_eq!(db.read("a").unwrap(), None);
    assert_eq!(db.delete("").unwrap(), Some(String::new()));
    assert_eq!(db.read("").unwrap(), None);
    db.put("").unwrap();
    db.close().unwrap();

    let db = Db::open(dir.path(), Options::default()).unwrap();
    assert_eq!(db.read("").unwrap(), Some(String::new()));
}

/// A record larger than the store threshold still gets written, alone
#[test]
fn test_record_larger_than_threshold() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(
        dir.path(),
        Options::default().partition_count(1).max_store_bytes(HEADER_SIZE as u64),
    )
    .unwrap();

    let key = "x".repeat(1000);
    db.put(&key).unwrap();
    db.put("y").unwrap();

    let segments = db.segments(1).unwrap();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments[0].store_bytes, (HEADER_SIZE + 1000) as u64);
    assert_eq!(db.read(&key).unwrap(), Some(key.clone()));
}

/// Every append rotates when each record fills a segment
#[test]
fn test_one_record_per_segment() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path(), Options::default().partition_count(1).max_store_bytes(1))
        .unwrap();

    for i in 0..10 {
        db.put(&format!("r{}", i)).unwrap();
    }

    let segments = db.segments(1).unwrap();
    assert_eq!(segments.len(), 10);
    assert!(segments.iter().all(|s| s.sealed));
    assert!(segments.iter().all(|s| s.index_bytes == 40));
}

/// Invalid options are rejected before anything touches disk
#[test]
fn test_invalid_options() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db");

    assert!(Db::open(&path, Options::default().partition_count(0)).unwrap_err().is_config());
    assert!(Db::open(&path, Options::default().max_store_bytes(0)).is_err());
    assert!(Db::open(&path, Options::default().partition_key("")).is_err());
    assert!(!path.exists());
}

/// The partition key name is recorded but does not affect storage
#[test]
fn test_partition_key_is_documentary() {
    let dir = TempDir::new().unwrap();

    {
        let db = Db::open(dir.path(), Options::default().partition_key("user_id")).unwrap();
        assert_eq!(db.options().table.partition_key, "user_id");
        db.put("same").unwrap();
        db.close().unwrap();
    }

    let db = Db::open(dir.path(), Options::default().partition_key("order_id")).unwrap();
    assert_eq!(db.read("same").unwrap(), Some("same".to_string()));
}

/// Unsynced writes are still visible to the handle that made them
#[test]
fn test_unsynced_writes_visible() {
    let dir = TempDir::new().unwrap();
    let db = Db::open(dir.path(), Options::default().sync_writes(false)).unwrap();

    db.put("fast").unwrap();
    assert_eq!(db.read("fast").unwrap(), Some("fast".to_string()));
    db.sync().unwrap();
    db.close().unwrap();
}
