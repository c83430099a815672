// tests/integration/hub_test.rs

//! Integration tests for the broadcast hub
//! Tests: register, unregister, fan-out, slow-peer eviction

use cloudvar::core::CloudVarError;
use cloudvar::core::hub::{BroadcastHub, Delivery, Outbound, PeerHandle};
use cloudvar::core::protocol::{ServerMessage, VariableValue};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

struct TestPeer {
    handle: Arc<PeerHandle>,
    rx: mpsc::Receiver<Outbound>,
    kill_rx: broadcast::Receiver<()>,
}

fn test_peer(session_id: u64, capacity: usize) -> TestPeer {
    let addr: SocketAddr = format!("127.0.0.1:{}", 41000 + session_id).parse().unwrap();
    let (tx, rx) = mpsc::channel(capacity);
    let (kill_tx, kill_rx) = broadcast::channel(1);
    TestPeer {
        handle: Arc::new(PeerHandle::new(session_id, addr, tx, kill_tx)),
        rx,
        kill_rx,
    }
}

fn score(value: i64) -> ServerMessage {
    ServerMessage::set("score", VariableValue::from(value))
}

fn expect_frame(item: Outbound) -> String {
    match item {
        Outbound::Frame(frame) => frame.to_string(),
        Outbound::Snapshot(_) => panic!("Expected a single frame, got a snapshot"),
    }
}

#[tokio::test]
async fn test_register_and_unregister() {
    let hub = BroadcastHub::new();
    let peer = test_peer(1, 4);

    assert!(hub.is_empty());
    hub.register(peer.handle.clone());
    assert_eq!(hub.len(), 1);
    assert!(hub.contains(1));

    assert!(hub.unregister(1));
    assert!(!hub.unregister(1));
    assert!(hub.is_empty());
}

#[tokio::test]
async fn test_publish_with_no_peers() {
    let hub = BroadcastHub::new();
    assert_eq!(hub.publish(&score(1)).unwrap(), Delivery::default());
}

#[tokio::test]
async fn test_publish_reaches_every_peer_in_order() {
    let hub = BroadcastHub::new();
    let mut a = test_peer(1, 8);
    let mut b = test_peer(2, 8);
    hub.register(a.handle.clone());
    hub.register(b.handle.clone());

    for value in 1..=3 {
        let delivery = hub.publish(&score(value)).unwrap();
        assert_eq!(
            delivery,
            Delivery {
                delivered: 2,
                failed: 0
            }
        );
    }

    for peer in [&mut a, &mut b] {
        for value in 1..=3 {
            assert_eq!(
                expect_frame(peer.rx.recv().await.unwrap()),
                format!(r#"{{"method":"set","name":"score","value":{value}}}"#)
            );
        }
    }
}

#[tokio::test]
async fn test_unregistered_peer_receives_nothing() {
    let hub = BroadcastHub::new();
    let mut a = test_peer(1, 8);
    hub.register(a.handle.clone());
    hub.unregister(1);

    hub.publish(&score(1)).unwrap();
    assert!(a.rx.try_recv().is_err());
}

#[tokio::test]
async fn test_full_queue_evicts_only_the_slow_peer() {
    let hub = BroadcastHub::new();
    let mut slow = test_peer(1, 1);
    let mut fast = test_peer(2, 8);
    hub.register(slow.handle.clone());
    hub.register(fast.handle.clone());

    hub.publish(&score(1)).unwrap();
    let delivery = hub.publish(&score(2)).unwrap();
    assert_eq!(
        delivery,
        Delivery {
            delivered: 1,
            failed: 1
        }
    );

    assert!(slow.handle.is_evicted());
    assert!(slow.kill_rx.try_recv().is_ok());
    assert_eq!(slow.handle.dropped_count(), 1);

    // The fast peer saw both updates.
    expect_frame(fast.rx.recv().await.unwrap());
    assert!(expect_frame(fast.rx.recv().await.unwrap()).contains("\"value\":2"));

    // Once evicted, a peer gets nothing more even if its queue drains.
    slow.rx.recv().await.unwrap();
    hub.publish(&score(3)).unwrap();
    assert!(slow.rx.try_recv().is_err());
    assert_eq!(slow.handle.dropped_count(), 2);
}

#[tokio::test]
async fn test_evict_signals_only_once() {
    let mut peer = test_peer(5, 1);
    assert!(peer.handle.evict());
    assert!(!peer.handle.evict());
    assert!(peer.kill_rx.try_recv().is_ok());
    assert!(peer.kill_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_offer_to_closed_queue_fails() {
    let peer = test_peer(9, 4);
    drop(peer.rx);
    let err = peer
        .handle
        .offer(Outbound::Frame(Arc::from("{}")))
        .unwrap_err();
    assert_eq!(err, CloudVarError::Delivery(9));
}
