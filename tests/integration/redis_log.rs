//! Redis Streams log tests
//!
//! These need a running Redis (`REDIS_URL`, default `redis://127.0.0.1:6379/0`):
//!
//! ```text
//! cargo test -- --ignored redis_log
//! ```
//!
//! Every test works on its own randomly named topic.

use std::time::Duration;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use serial_test::serial;
use streamcast::backend::error::BackendError;
use streamcast::backend::stream::{DurableLog, GroupStart, PendingRange, ReadCursor, RedisStreamLog};
use streamcast::shared::entry::encode_payload;
use uuid::Uuid;

use crate::common::*;
use crate::{assert_err, assert_ok};

async fn connect() -> RedisStreamLog {
    assert_ok!(
        RedisStreamLog::connect(&redis_url(), Duration::from_millis(800)).await,
        "Redis must be reachable for ignored tests"
    )
}

fn topic() -> String {
    format!("streamcast-test-{}", Uuid::new_v4())
}

fn payload(value: Value) -> Bytes {
    assert_ok!(encode_payload(&value))
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_append_and_read_in_order() {
    let log = connect().await;
    let topic = topic();

    let first = assert_ok!(log.append(&topic, payload(json!(1)), 100).await);
    let second = assert_ok!(log.append(&topic, payload(json!(2)), 100).await);
    assert!(first < second);

    let entries = assert_ok!(log.read_from(&topic, ReadCursor::Beginning, Duration::ZERO).await);
    let ids: Vec<_> = entries.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, vec![first, second]);

    let after = assert_ok!(log.read_from(&topic, ReadCursor::After(first), Duration::ZERO).await);
    assert_eq!(after.len(), 1);
    assert_eq!(assert_ok!(after[0].decode::<Value>()), json!(2));

    assert_eq!(assert_ok!(log.last_id(&topic).await), Some(second));
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_blocking_read_wakes_on_append() {
    let log = std::sync::Arc::new(connect().await);
    let topic = topic();
    assert_ok!(log.append(&topic, payload(json!("seed")), 100).await);
    let last = assert_ok!(log.last_id(&topic).await);
    let cursor = match last {
        Some(id) => ReadCursor::After(id),
        None => panic!("Expected a last id after append"),
    };

    let reader = {
        let log = log.clone();
        let topic = topic.clone();
        tokio::spawn(async move { log.read_from(&topic, cursor, Duration::from_secs(2)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_ok!(log.append(&topic, payload(json!("late")), 100).await);

    let entries = assert_ok!(assert_ok!(reader.await));
    assert_eq!(entries.len(), 1);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_retention_trims_oldest() {
    let log = connect().await;
    let topic = topic();

    for n in 1..=3 {
        assert_ok!(log.append(&topic, payload(json!(n)), 2).await);
    }

    assert_eq!(assert_ok!(log.len(&topic).await), 2);
    let entries = assert_ok!(log.read_from(&topic, ReadCursor::Beginning, Duration::ZERO).await);
    let values: Vec<Value> = entries
        .iter()
        .map(|entry| assert_ok!(entry.decode::<Value>()))
        .collect();
    assert_eq!(values, vec![json!(2), json!(3)]);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_group_lifecycle() {
    let log = connect().await;
    let topic = topic();

    assert_ok!(log.create_group(&topic, "workers", ReadCursor::Beginning).await);
    assert_ok!(log.create_group(&topic, "workers", ReadCursor::Beginning).await);
    assert_err!(
        log.create_group_strict(&topic, "workers", ReadCursor::Beginning).await,
        BackendError::GroupAlreadyExists { .. }
    );

    let id = assert_ok!(log.append(&topic, payload(json!({"job": 1})), 100).await);
    let delivered = assert_ok!(
        log.group_read(&topic, "workers", "alice", Duration::ZERO, 10, GroupStart::New)
            .await
    );
    assert_eq!(delivered.len(), 1);

    let pending = assert_ok!(log.pending_range(&topic, "workers", PendingRange::default()).await);
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
    assert_eq!(pending[0].consumer, "alice");

    let history = assert_ok!(
        log.group_read(
            &topic,
            "workers",
            "alice",
            Duration::ZERO,
            10,
            GroupStart::History(streamcast::shared::entry::EntryId::MIN)
        )
        .await
    );
    assert_eq!(history.len(), 1);

    assert!(assert_ok!(log.ack(&topic, "workers", id).await));
    assert!(!assert_ok!(log.ack(&topic, "workers", id).await));
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_reclaim_moves_idle_entries() {
    let log = connect().await;
    let topic = topic();

    assert_ok!(log.create_group(&topic, "workers", ReadCursor::Beginning).await);
    let id = assert_ok!(log.append(&topic, payload(json!("job")), 100).await);
    assert_ok!(
        log.group_read(&topic, "workers", "crashed", Duration::ZERO, 10, GroupStart::New)
            .await
    );

    let too_soon = assert_ok!(log.reclaim(&topic, "workers", "rescuer", Duration::from_secs(60)).await);
    assert!(too_soon.is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    let claimed = assert_ok!(log.reclaim(&topic, "workers", "rescuer", Duration::from_millis(100)).await);
    assert_eq!(claimed.len(), 1);
    assert_eq!(claimed[0].id, id);

    let pending = assert_ok!(log.pending_range(&topic, "workers", PendingRange::default()).await);
    assert_eq!(pending[0].consumer, "rescuer");
    assert!(pending[0].delivery_count >= 2);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_missing_group_is_reported() {
    let log = connect().await;
    let topic = topic();
    assert_ok!(log.append(&topic, payload(json!(1)), 100).await);

    assert_err!(
        log.group_read(&topic, "ghosts", "alice", Duration::ZERO, 1, GroupStart::New)
            .await,
        BackendError::NoSuchGroup { .. }
    );
}
