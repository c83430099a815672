// tests/integration/store_test.rs

//! Integration tests for the variable store
//! Tests: set, snapshot, attach ordering, persistence failures, flush

use super::test_helpers::{MemoryStore, TestContext};
use cloudvar::core::hub::{Outbound, PeerHandle};
use cloudvar::core::persistence::VariableTable;
use cloudvar::core::protocol::VariableValue;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

fn test_peer(session_id: u64, capacity: usize) -> (Arc<PeerHandle>, mpsc::Receiver<Outbound>) {
    let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
    let (tx, rx) = mpsc::channel(capacity);
    let (kill_tx, _) = broadcast::channel(1);
    (Arc::new(PeerHandle::new(session_id, addr, tx, kill_tx)), rx)
}

fn frame_json(item: &Outbound) -> Vec<Value> {
    match item {
        Outbound::Frame(frame) => vec![serde_json::from_str(frame).unwrap()],
        Outbound::Snapshot(frames) => frames
            .iter()
            .map(|f| serde_json::from_str(f).unwrap())
            .collect(),
    }
}

// ===== set / get =====

#[tokio::test]
async fn test_set_then_get() {
    let ctx = TestContext::new().await;
    let store = &ctx.state.store;

    let outcome = store.set("score".into(), VariableValue::from(10)).await;
    assert!(outcome.is_persisted());
    assert_eq!(store.get("score").await, Some(VariableValue::from(10)));
    assert_eq!(store.get("missing").await, None);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_set_overwrites_and_keeps_insertion_order() {
    let ctx = TestContext::new().await;
    let store = &ctx.state.store;

    store.set("a".into(), VariableValue::from(1)).await;
    store.set("b".into(), VariableValue::from(2)).await;
    store.set("a".into(), VariableValue::from("one")).await;

    let snapshot = store.snapshot().await;
    let names: Vec<&str> = snapshot.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(snapshot.get("a"), Some(&VariableValue::from("one")));
}

#[tokio::test]
async fn test_set_writes_pretty_json_file() {
    let ctx = TestContext::new().await;
    ctx.state
        .store
        .set("score".into(), VariableValue::from(10))
        .await;

    let contents = ctx.read_data_file();
    assert!(contents.contains("\"score\": 10"), "file was: {contents}");
    let parsed: Value = serde_json::from_str(&contents).unwrap();
    assert_eq!(parsed, json!({ "score": 10 }));
}

#[tokio::test]
async fn test_reset_to_same_value_broadcasts_and_keeps_file_identical() {
    let ctx = TestContext::new().await;
    let store = &ctx.state.store;
    store.set("x".into(), VariableValue::from(true)).await;
    store.set("y".into(), VariableValue::from("hello")).await;
    let before = ctx.read_data_file();

    let (peer, mut rx) = test_peer(1, 16);
    store.attach(peer).await.unwrap();
    let _snapshot = rx.recv().await.unwrap();

    let outcome = store.set("x".into(), VariableValue::from(true)).await;
    assert_eq!(outcome.delivery.delivered, 1);
    assert_eq!(
        frame_json(&rx.recv().await.unwrap()),
        vec![json!({ "method": "set", "name": "x", "value": true })]
    );
    assert_eq!(ctx.read_data_file(), before);
}

// ===== attach =====

#[tokio::test]
async fn test_attach_queues_snapshot_before_later_updates() {
    let ctx = TestContext::new().await;
    let store = &ctx.state.store;
    store.set("a".into(), VariableValue::from(1)).await;
    store.set("b".into(), VariableValue::from(2)).await;

    let (peer, mut rx) = test_peer(7, 4);
    let sent = store.attach(peer).await.unwrap();
    assert_eq!(sent, 2);
    assert!(ctx.state.hub.contains(7));

    store.set("c".into(), VariableValue::from(3)).await;

    let first = rx.recv().await.unwrap();
    assert!(matches!(first, Outbound::Snapshot(_)));
    assert_eq!(
        frame_json(&first),
        vec![
            json!({ "method": "set", "name": "a", "value": 1 }),
            json!({ "method": "set", "name": "b", "value": 2 }),
        ]
    );
    assert_eq!(
        frame_json(&rx.recv().await.unwrap()),
        vec![json!({ "method": "set", "name": "c", "value": 3 })]
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_attach_with_empty_table_sends_nothing() {
    let ctx = TestContext::new().await;
    let (peer, mut rx) = test_peer(3, 4);
    assert_eq!(ctx.state.store.attach(peer).await.unwrap(), 0);
    assert!(ctx.state.hub.contains(3));
    assert!(rx.try_recv().is_err());
}

// ===== persistence failures =====

#[tokio::test]
async fn test_persist_failure_keeps_value_and_still_broadcasts() {
    let backend = Arc::new(MemoryStore::new());
    let ctx = TestContext::with_backend(backend.clone()).await;
    let store = &ctx.state.store;

    let (peer, mut rx) = test_peer(1, 4);
    store.attach(peer).await.unwrap();

    backend.set_failing(true);
    let outcome = store.set("score".into(), VariableValue::from(5)).await;

    assert!(!outcome.is_persisted());
    assert_eq!(outcome.delivery.delivered, 1);
    assert_eq!(store.get("score").await, Some(VariableValue::from(5)));
    assert!(store.is_dirty());
    assert!(backend.saved().is_none());
    assert_eq!(
        frame_json(&rx.recv().await.unwrap()),
        vec![json!({ "method": "set", "name": "score", "value": 5 })]
    );
}

#[tokio::test]
async fn test_successful_set_after_failure_persists_everything() {
    let backend = Arc::new(MemoryStore::new());
    let ctx = TestContext::with_backend(backend.clone()).await;
    let store = &ctx.state.store;

    backend.set_failing(true);
    store.set("a".into(), VariableValue::from(1)).await;
    backend.set_failing(false);
    store.set("b".into(), VariableValue::from(2)).await;

    assert!(!store.is_dirty());
    let saved = backend.saved().unwrap();
    assert_eq!(saved.get("a"), Some(&VariableValue::from(1)));
    assert_eq!(saved.get("b"), Some(&VariableValue::from(2)));
}

#[tokio::test]
async fn test_flush_only_writes_when_dirty() {
    let backend = Arc::new(MemoryStore::new());
    let ctx = TestContext::with_backend(backend.clone()).await;
    let store = &ctx.state.store;

    assert!(!store.flush().await.unwrap());

    backend.set_failing(true);
    store.set("a".into(), VariableValue::from(1)).await;
    assert!(store.flush().await.is_err());
    assert!(store.is_dirty());

    backend.set_failing(false);
    assert!(store.flush().await.unwrap());
    assert!(!store.is_dirty());
    assert_eq!(backend.save_count(), 1);
}

#[tokio::test]
async fn test_open_loads_initial_table() {
    let mut initial = VariableTable::new();
    initial.insert("saved".into(), VariableValue::from("yes"));
    let ctx = TestContext::with_backend(Arc::new(MemoryStore::with_initial(initial))).await;

    assert_eq!(
        ctx.state.store.get("saved").await,
        Some(VariableValue::from("yes"))
    );
    assert!(!ctx.state.store.is_dirty());
}

// ===== concurrency =====

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sets_lose_no_updates() {
    let ctx = TestContext::new().await;
    let mut tasks = Vec::new();
    for sender in 0..8 {
        let store = ctx.state.store.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..10 {
                store
                    .set(format!("var_{sender}_{i}"), VariableValue::from(i as i64))
                    .await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = ctx.state.store.snapshot().await;
    assert_eq!(snapshot.len(), 80);

    let persisted: Value = serde_json::from_str(&ctx.read_data_file()).unwrap();
    let expected = serde_json::to_value(snapshot.as_table()).unwrap();
    assert_eq!(persisted, expected);
}
