//! Delivery guarantee tests
//!
//! Publisher and subscriber API over the in-memory log: tailing, consumer
//! group fan-in, reclaim of entries left behind by a crashed consumer, and
//! retention.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use streamcast::backend::error::BackendError;
use streamcast::backend::shutdown::TaskTracker;
use streamcast::backend::stream::{
    DurableLog, EventPublisher, EventSubscriber, GroupStart, MemoryLog, PendingRange, ReadCursor,
    ReaderOptions, ReclaimOptions,
};

use crate::common::*;
use crate::{assert_err, assert_ok};

fn fast_options() -> ReaderOptions {
    ReaderOptions {
        block: Duration::from_millis(50),
        count: 1,
        retry_delay: Duration::from_millis(20),
    }
}

fn setup() -> (Arc<dyn DurableLog>, EventPublisher, EventSubscriber, Arc<TaskTracker>) {
    let log: Arc<dyn DurableLog> = Arc::new(MemoryLog::new());
    let tracker = Arc::new(TaskTracker::new());
    let publisher = EventPublisher::new(log.clone(), 1000);
    let subscriber = EventSubscriber::new(log.clone(), tracker.clone(), fast_options());
    (log, publisher, subscriber, tracker)
}

#[tokio::test]
async fn test_late_subscriber_skips_history() {
    let (_log, publisher, subscriber, tracker) = setup();
    assert_ok!(publisher.publish("orders", &json!({"n": 0})).await);

    let (handler, seen) = collecting_handler();
    assert_ok!(subscriber.subscribe(handler, "orders").await);
    assert_ok!(publisher.publish("orders", &json!({"n": 1})).await);
    assert_ok!(publisher.publish("orders", &json!({"n": 2})).await);

    wait_until(DELIVERY_TIMEOUT, || {
        let seen = seen.clone();
        async move { snapshot(&seen).len() >= 2 }
    })
    .await;
    assert_eq!(snapshot(&seen), vec![json!({"n": 1}), json!({"n": 2})]);

    tracker.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_group_members_share_the_work() {
    let (_log, publisher, subscriber, tracker) = setup();

    let (first, first_seen) = collecting_handler();
    let (second, second_seen) = collecting_handler();
    assert_ok!(subscriber.group_subscribe(first, "billing", "orders", "worker-1").await);
    assert_ok!(subscriber.group_subscribe(second, "billing", "orders", "worker-2").await);

    for n in 0..10 {
        assert_ok!(publisher.publish("orders", &json!({ "n": n })).await);
    }

    wait_until(DELIVERY_TIMEOUT, || {
        let (a, b) = (first_seen.clone(), second_seen.clone());
        async move { snapshot(&a).len() + snapshot(&b).len() >= 10 }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut all: Vec<Value> = snapshot(&first_seen);
    all.extend(snapshot(&second_seen));
    assert_eq!(all.len(), 10, "each entry is delivered to one member only");
    let distinct: HashSet<String> = all.iter().map(|v| v.to_string()).collect();
    assert_eq!(distinct.len(), 10);

    tracker.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_every_group_sees_every_entry() {
    let (_log, publisher, subscriber, tracker) = setup();

    let (billing, billing_seen) = collecting_handler();
    let (audit, audit_seen) = collecting_handler();
    assert_ok!(subscriber.group_subscribe(billing, "billing", "orders", "worker").await);
    assert_ok!(subscriber.group_subscribe(audit, "audit", "orders", "worker").await);

    for n in 0..5 {
        assert_ok!(publisher.publish("orders", &json!(n)).await);
    }

    let expected: Vec<Value> = (0..5).map(|n| json!(n)).collect();
    for seen in [&billing_seen, &audit_seen] {
        wait_until(DELIVERY_TIMEOUT, || {
            let seen = seen.clone();
            async move { snapshot(&seen).len() >= 5 }
        })
        .await;
        assert_eq!(snapshot(seen), expected);
    }

    tracker.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_group_created_before_publish_gets_history() {
    let (_log, publisher, subscriber, tracker) = setup();
    assert_ok!(publisher.group_publish("mailer", "signups", &json!({"user": "ada"})).await);

    let (handler, seen) = collecting_handler();
    assert_ok!(subscriber.group_subscribe(handler, "mailer", "signups", "worker").await);

    wait_until(DELIVERY_TIMEOUT, || {
        let seen = seen.clone();
        async move { !snapshot(&seen).is_empty() }
    })
    .await;
    assert_eq!(snapshot(&seen), vec![json!({"user": "ada"})]);

    tracker.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_crashed_consumer_entries_are_reclaimed() {
    let (log, publisher, subscriber, tracker) = setup();
    assert_ok!(log.create_group("jobs", "workers", ReadCursor::Beginning).await);
    assert_ok!(publisher.publish("jobs", &json!({"job": 7})).await);

    // Read but never acknowledged, as if the consumer died mid-delivery
    let taken = assert_ok!(
        log.group_read("jobs", "workers", "crashed", Duration::ZERO, 10, GroupStart::New)
            .await
    );
    assert_eq!(taken.len(), 1);

    let (handler, seen) = collecting_handler();
    let subscriber = subscriber.with_reclaim(ReclaimOptions {
        range: PendingRange::default(),
        min_idle: Duration::from_millis(50),
        interval: Duration::from_millis(50),
    });
    subscriber.check_pending_and_claim(handler, "workers", "jobs", "rescuer");

    wait_until(DELIVERY_TIMEOUT, || {
        let seen = seen.clone();
        async move { !snapshot(&seen).is_empty() }
    })
    .await;
    assert_eq!(snapshot(&seen), vec![json!({"job": 7})]);

    let log_for_check = log.clone();
    wait_until(DELIVERY_TIMEOUT, move || {
        let log = log_for_check.clone();
        async move {
            log.pending_range("jobs", "workers", PendingRange::default())
                .await
                .map(|pending| pending.is_empty())
                .unwrap_or(false)
        }
    })
    .await;

    tracker.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_retention_keeps_newest_entries() {
    let log: Arc<dyn DurableLog> = Arc::new(MemoryLog::new());
    let publisher = EventPublisher::new(log.clone(), 2);

    for n in 1..=3 {
        assert_ok!(publisher.publish("metrics", &json!(n)).await);
    }

    let entries = assert_ok!(log.read_from("metrics", ReadCursor::Beginning, Duration::ZERO).await);
    let values: Vec<Value> = entries
        .iter()
        .map(|entry| assert_ok!(entry.decode::<Value>()))
        .collect();
    assert_eq!(values, vec![json!(2), json!(3)]);
}

#[tokio::test]
async fn test_create_group_is_idempotent() {
    let log: Arc<dyn DurableLog> = Arc::new(MemoryLog::new());

    assert_ok!(log.create_group("orders", "billing", ReadCursor::Beginning).await);
    assert_ok!(log.create_group("orders", "billing", ReadCursor::Beginning).await);
    assert_err!(
        log.create_group_strict("orders", "billing", ReadCursor::Beginning).await,
        BackendError::GroupAlreadyExists { .. }
    );
}
