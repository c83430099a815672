// tests/integration/persistence_test.rs

//! Integration tests for the JSON snapshot file
//! Tests: loading, atomic rewrites, leftover temp files, retry on recovery

use super::test_helpers::{MemoryStore, init_tracing, test_config};
use cloudvar::core::CloudVarError;
use cloudvar::core::hub::BroadcastHub;
use cloudvar::core::persistence::{
    JsonSnapshotFile, SnapshotRetryTask, SnapshotStore, VariableTable,
};
use cloudvar::core::protocol::VariableValue;
use cloudvar::core::storage::VariableStore;
use cloudvar::server;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

fn table(entries: &[(&str, VariableValue)]) -> VariableTable {
    entries
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

// ===== load =====

#[tokio::test]
async fn test_load_missing_file_yields_empty_table() {
    let dir = tempfile::tempdir().unwrap();
    let file = JsonSnapshotFile::new(dir.path().join("nothing.json"));
    assert!(file.load().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_load_blank_file_yields_empty_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blank.json");
    fs::write(&path, "  \n").unwrap();
    assert!(JsonSnapshotFile::new(&path).load().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_load_rejects_invalid_json_and_non_objects() {
    let dir = tempfile::tempdir().unwrap();

    let invalid = dir.path().join("invalid.json");
    fs::write(&invalid, "{ not json").unwrap();
    let err = JsonSnapshotFile::new(&invalid).load().await.unwrap_err();
    assert!(matches!(err, CloudVarError::Persistence(_)));

    let array = dir.path().join("array.json");
    fs::write(&array, "[1, 2, 3]").unwrap();
    let err = JsonSnapshotFile::new(&array).load().await.unwrap_err();
    assert!(matches!(err, CloudVarError::Persistence(_)));
}

#[tokio::test]
async fn test_load_skips_non_scalar_entries_and_keeps_file_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.json");
    fs::write(
        &path,
        r#"{"zeta": 1, "nested": {"a": 1}, "alpha": "x", "nothing": null, "list": [1], "flag": true}"#,
    )
    .unwrap();

    let loaded = JsonSnapshotFile::new(&path).load().await.unwrap();
    let names: Vec<&str> = loaded.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["zeta", "alpha", "flag"]);
}

// ===== save =====

#[tokio::test]
async fn test_save_is_pretty_printed_and_reloadable() {
    let dir = tempfile::tempdir().unwrap();
    let file = JsonSnapshotFile::new(dir.path().join("cloud.json"));
    let original = table(&[
        ("score", VariableValue::from(10)),
        ("name", VariableValue::from("bob")),
        ("done", VariableValue::from(false)),
    ]);

    file.save(&original).await.unwrap();

    let contents = fs::read_to_string(file.path()).unwrap();
    assert!(contents.contains("\"score\": 10"));
    assert!(contents.contains("\n  \"name\": \"bob\""));
    assert_eq!(file.load().await.unwrap(), original);
}

#[tokio::test]
async fn test_save_leaves_no_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    let file = JsonSnapshotFile::new(dir.path().join("cloud.json"));
    for i in 0..5 {
        file.save(&table(&[("i", VariableValue::from(i))]))
            .await
            .unwrap();
    }
    let entries: Vec<String> = fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["cloud.json".to_string()]);
}

#[tokio::test]
async fn test_save_into_missing_directory_fails_without_damage() {
    let dir = tempfile::tempdir().unwrap();
    let file = JsonSnapshotFile::new(dir.path().join("gone/cloud.json"));
    let err = file
        .save(&table(&[("a", VariableValue::from(1))]))
        .await
        .unwrap_err();
    assert!(matches!(err, CloudVarError::Persistence(_)));
    assert!(!dir.path().join("gone").exists());
}

#[tokio::test]
async fn test_ensure_parent_dir_creates_directories() {
    let dir = tempfile::tempdir().unwrap();
    let file = JsonSnapshotFile::new(dir.path().join("a/b/cloud.json"));
    file.ensure_parent_dir().await.unwrap();
    assert!(dir.path().join("a/b").is_dir());
}

// ===== startup =====

#[tokio::test]
async fn test_setup_removes_leftover_temp_files_and_loads_data() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let data_dir = dir.path().join("data");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(data_dir.join("cloud_data.json"), r#"{"kept": 1}"#).unwrap();
    fs::write(data_dir.join("cloud_data.json.tmp.12345"), "{ partial").unwrap();

    let ctx = server::setup(config).await.unwrap();

    assert!(!data_dir.join("cloud_data.json.tmp.12345").exists());
    assert_eq!(
        ctx.state.store.get("kept").await,
        Some(VariableValue::from(1))
    );
}

#[tokio::test]
async fn test_setup_fails_on_corrupt_data_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    fs::create_dir_all(dir.path().join("data")).unwrap();
    fs::write(dir.path().join("data/cloud_data.json"), "{ broken").unwrap();

    assert!(server::setup(config).await.is_err());
}

// ===== retry =====

#[tokio::test]
async fn test_retry_task_persists_after_storage_recovers() {
    init_tracing();
    let backend = Arc::new(MemoryStore::new());
    let store = Arc::new(
        VariableStore::open(backend.clone(), Arc::new(BroadcastHub::new()))
            .await
            .unwrap(),
    );

    backend.set_failing(true);
    store.set("late".into(), VariableValue::from(1)).await;
    assert!(store.is_dirty());

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = tokio::spawn(
        SnapshotRetryTask::new(store.clone(), Duration::from_millis(20)).run(shutdown_rx),
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.is_dirty());

    backend.set_failing(false);
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.is_dirty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("Retry task never persisted the table");
    assert_eq!(
        backend.saved().unwrap().get("late"),
        Some(&VariableValue::from(1))
    );

    shutdown_tx.send(()).unwrap();
    task.await.unwrap();
}
