//! Fan-out integration tests
//!
//! Messages sent to a topic's broadcaster reach every live connection of
//! that topic, on one instance (loopback) or across instances sharing a
//! durable log.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use streamcast::backend::realtime::LiveConnection;
use streamcast::backend::server::create_app_with_log;
use streamcast::backend::stream::{DurableLog, MemoryLog, ReadCursor};
use std::time::Duration;

use crate::assert_ok;
use crate::common::*;

#[tokio::test]
async fn test_failing_client_does_not_block_others() {
    let app = assert_ok!(create_app_with_log(loopback_config(&["chat"]), None).await);
    let hub = assert_ok!(app.state.hubs.get("chat"));

    let first = RecordingConnection::new();
    let broken = FailingConnection::new();
    let last = RecordingConnection::new();
    hub.registry().accept(first.clone()).await;
    hub.registry().accept(broken.clone()).await;
    hub.registry().accept(last.clone()).await;

    assert_ok!(hub.broadcaster().send(json!({"text": "hello"})).await);

    let expected = vec![json!({"text": "hello"})];
    assert_eq!(first.wait_for(1, DELIVERY_TIMEOUT).await, expected);
    assert_eq!(last.wait_for(1, DELIVERY_TIMEOUT).await, expected);

    // Send failures alone never remove a connection
    assert!(hub.registry().contains(broken.id()).await);
    assert_eq!(hub.registry().len().await, 3);

    app.shutdown().await;
}

#[tokio::test]
async fn test_loopback_preserves_send_order() {
    let app = assert_ok!(create_app_with_log(loopback_config(&["chat"]), None).await);
    let hub = assert_ok!(app.state.hubs.get("chat"));
    let client = RecordingConnection::new();
    hub.registry().accept(client.clone()).await;

    for n in 0..20 {
        assert_ok!(hub.broadcaster().send(json!({ "n": n })).await);
    }

    let received = client.wait_for(20, DELIVERY_TIMEOUT).await;
    let expected: Vec<_> = (0..20).map(|n| json!({ "n": n })).collect();
    assert_eq!(received, expected);

    app.shutdown().await;
}

#[tokio::test]
async fn test_topics_are_isolated() {
    let app = assert_ok!(create_app_with_log(loopback_config(&["chat", "alerts"]), None).await);
    let chat = assert_ok!(app.state.hubs.get("chat"));
    let alerts = assert_ok!(app.state.hubs.get("alerts"));

    let chat_client = RecordingConnection::new();
    let alerts_client = RecordingConnection::new();
    chat.registry().accept(chat_client.clone()).await;
    alerts.registry().accept(alerts_client.clone()).await;

    assert_ok!(chat.broadcaster().send(json!("only chat")).await);
    chat_client.wait_for(1, DELIVERY_TIMEOUT).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(alerts_client.received().is_empty());

    app.shutdown().await;
}

#[tokio::test]
async fn test_loopback_never_touches_the_log() {
    let log: Arc<dyn DurableLog> = Arc::new(MemoryLog::new());
    let app = assert_ok!(create_app_with_log(loopback_config(&["chat"]), Some(log.clone())).await);
    let hub = assert_ok!(app.state.hubs.get("chat"));
    let client = RecordingConnection::new();
    hub.registry().accept(client.clone()).await;

    assert_ok!(hub.broadcaster().send(json!({"local": true})).await);
    client.wait_for(1, DELIVERY_TIMEOUT).await;

    assert_eq!(assert_ok!(log.len("chat").await), 0);
    app.shutdown().await;
}

#[tokio::test]
async fn test_durable_instances_share_messages() {
    let log: Arc<dyn DurableLog> = Arc::new(MemoryLog::new());
    let east = assert_ok!(create_app_with_log(durable_config(&["chat"]), Some(log.clone())).await);
    let west = assert_ok!(create_app_with_log(durable_config(&["chat"]), Some(log.clone())).await);

    let east_client = RecordingConnection::new();
    let west_client = RecordingConnection::new();
    assert_ok!(east.state.hubs.get("chat"))
        .registry()
        .accept(east_client.clone())
        .await;
    assert_ok!(west.state.hubs.get("chat"))
        .registry()
        .accept(west_client.clone())
        .await;

    let east_hub = assert_ok!(east.state.hubs.get("chat"));
    assert_ok!(east_hub.broadcaster().send(json!({"from": "east"})).await);

    let expected = vec![json!({"from": "east"})];
    assert_eq!(west_client.wait_for(1, DELIVERY_TIMEOUT).await, expected);
    assert_eq!(east_client.wait_for(1, DELIVERY_TIMEOUT).await, expected);

    let entries = assert_ok!(log.read_from("chat", ReadCursor::Beginning, Duration::ZERO).await);
    assert_eq!(entries.len(), 1);

    east.shutdown().await;
    west.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_drains_loopback_tasks() {
    let app = assert_ok!(create_app_with_log(loopback_config(&["chat"]), None).await);
    let hub = assert_ok!(app.state.hubs.get("chat"));
    let client = RecordingConnection::new();
    hub.registry().accept(client.clone()).await;

    assert_ok!(hub.broadcaster().send(json!(1)).await);
    client.wait_for(1, DELIVERY_TIMEOUT).await;

    let report = app.shutdown().await;
    assert_eq!(report.aborted, 0);
    assert!(report.completed >= 2);
    assert!(app.state.tracker.is_shutting_down());
}
