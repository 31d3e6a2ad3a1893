/// Snapshot persistence tests for the in-memory store

use sdbsql_api::{Connection, MemoryStore, MemoryStoreConfig, Value};
use sdbsql_test_utils::{insert_users, TestConnection};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_snapshot_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("store.json");

    {
        let test = TestConnection::new();
        test.create_table("users").await;
        insert_users(&test.conn, "users", 10).await;
        test.store.save(&path).unwrap();
    }

    let store = MemoryStore::load(&path, MemoryStoreConfig::default()).unwrap();
    assert_eq!(store.item_count("users"), Some(10));

    let conn = Connection::new(Arc::new(store));
    let rows = conn
        .query("select name, age from users where id = 'ID0007'", &[])
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    assert_eq!(rows, vec![vec![Value::from("user7"), Value::Int(27)]]);
}

#[test]
fn test_load_missing_snapshot_fails() {
    let dir = TempDir::new().unwrap();
    let result = MemoryStore::load(dir.path().join("missing.json"), MemoryStoreConfig::default());
    assert!(result.is_err());
}

#[test]
fn test_load_corrupt_snapshot_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, b"{not json").unwrap();
    assert!(MemoryStore::load(&path, MemoryStoreConfig::default()).is_err());
}
