//! Property-based tests for the in-memory durable log

use std::collections::HashSet;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::{json, Value};
use streamcast::backend::stream::{DurableLog, GroupStart, MemoryLog, PendingRange, ReadCursor};
use streamcast::shared::entry::{encode_payload, EntryId};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn append_all(log: &MemoryLog, topic: &str, values: &[i64], cap: usize) -> Vec<EntryId> {
    let mut ids = Vec::with_capacity(values.len());
    for value in values {
        let payload = encode_payload(&json!(value)).unwrap();
        ids.push(log.append(topic, payload, cap).await.unwrap());
    }
    ids
}

proptest! {
    #[test]
    fn test_retention_keeps_newest_in_order(
        values in prop::collection::vec(any::<i64>(), 1..60),
        cap in 1usize..20,
    ) {
        let rt = runtime();
        let (ids, read, len) = rt.block_on(async {
            let log = MemoryLog::new();
            let ids = append_all(&log, "t", &values, cap).await;
            let read = log.read_from("t", ReadCursor::Beginning, Duration::ZERO).await.unwrap();
            let len = log.len("t").await.unwrap();
            (ids, read, len)
        });

        prop_assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));

        let kept = values.len().min(cap);
        prop_assert_eq!(len, kept);
        let expected: Vec<Value> = values[values.len() - kept..].iter().map(|v| json!(v)).collect();
        let actual: Vec<Value> = read.iter().map(|entry| entry.decode().unwrap()).collect();
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn test_read_after_cursor_returns_the_suffix(
        count in 1usize..40,
        split in any::<prop::sample::Index>(),
    ) {
        let rt = runtime();
        let values: Vec<i64> = (0..count as i64).collect();
        let at = split.index(count);
        let (ids, after) = rt.block_on(async {
            let log = MemoryLog::new();
            let ids = append_all(&log, "t", &values, 1000).await;
            let after = log
                .read_from("t", ReadCursor::After(ids[at]), Duration::ZERO)
                .await
                .unwrap();
            (ids, after)
        });

        let returned: Vec<EntryId> = after.iter().map(|entry| entry.id).collect();
        prop_assert_eq!(returned, ids[at + 1..].to_vec());
    }

    #[test]
    fn test_group_delivers_each_entry_once(
        count in 1usize..30,
        batch_size in 1usize..5,
        picks in prop::collection::vec(0usize..3, 1..100),
    ) {
        let rt = runtime();
        let consumers = ["a", "b", "c"];
        let values: Vec<i64> = (0..count as i64).collect();

        let (ids, delivered, pending, first_acks, second_acks, left) = rt.block_on(async {
            let log = MemoryLog::new();
            log.create_group("t", "g", ReadCursor::Beginning).await.unwrap();
            let ids = append_all(&log, "t", &values, 1000).await;

            let mut delivered = Vec::new();
            let mut turn = 0;
            loop {
                let consumer = consumers[picks[turn % picks.len()]];
                turn += 1;
                let batch = log
                    .group_read("t", "g", consumer, Duration::ZERO, batch_size, GroupStart::New)
                    .await
                    .unwrap();
                if batch.is_empty() {
                    break;
                }
                delivered.extend(batch.into_iter().map(|entry| entry.id));
            }

            let pending = log
                .pending_range("t", "g", PendingRange::with_count(1000))
                .await
                .unwrap()
                .len();

            let mut first_acks = Vec::new();
            let mut second_acks = Vec::new();
            for id in &delivered {
                first_acks.push(log.ack("t", "g", *id).await.unwrap());
            }
            for id in &delivered {
                second_acks.push(log.ack("t", "g", *id).await.unwrap());
            }
            let left = log
                .pending_range("t", "g", PendingRange::with_count(1000))
                .await
                .unwrap()
                .len();

            (ids, delivered, pending, first_acks, second_acks, left)
        });

        let distinct: HashSet<EntryId> = delivered.iter().copied().collect();
        prop_assert_eq!(distinct.len(), delivered.len());
        prop_assert_eq!(delivered, ids);
        prop_assert_eq!(pending, count);
        prop_assert!(first_acks.iter().all(|acked| *acked));
        prop_assert!(second_acks.iter().all(|acked| !*acked));
        prop_assert_eq!(left, 0);
    }
}
