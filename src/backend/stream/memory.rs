//! In-process durable log
//!
//! `MemoryLog` implements the full [`DurableLog`] contract without a
//! network hop: per-topic entry queues, consumer groups with pending entry
//! lists, and blocking reads woken by appends. It backs the test suite and
//! single-node deployments where "durable" only needs to outlive a
//! connection, not the process.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::backend::error::{BackendError, BackendResult};
use crate::backend::stream::log::{DurableLog, GroupStart, PendingRange, ReadCursor, RECLAIM_BATCH};
use crate::shared::entry::{Entry, EntryId, PendingEntry};

#[derive(Debug)]
struct PendingRecord {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

#[derive(Debug)]
struct GroupState {
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, PendingRecord>,
}

#[derive(Debug)]
struct TopicLog {
    entries: VecDeque<Entry>,
    last_id: EntryId,
    groups: HashMap<String, GroupState>,
    appended: watch::Sender<EntryId>,
}

impl TopicLog {
    fn new() -> Self {
        let (appended, _) = watch::channel(EntryId::MIN);
        Self {
            entries: VecDeque::new(),
            last_id: EntryId::MIN,
            groups: HashMap::new(),
            appended,
        }
    }
}

fn find_entry(entries: &VecDeque<Entry>, id: EntryId) -> Option<&Entry> {
    entries
        .binary_search_by(|e| e.id.cmp(&id))
        .ok()
        .map(|i| &entries[i])
}

fn no_such_group(topic: &str, group: &str) -> BackendError {
    BackendError::NoSuchGroup {
        group: group.to_string(),
        topic: topic.to_string(),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// In-memory [`DurableLog`]
#[derive(Debug, Default)]
pub struct MemoryLog {
    topics: Mutex<HashMap<String, TopicLog>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TopicLog>> {
        self.topics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `probe` against the topic until it yields a value or `block` elapses
    async fn wait_for<T, F>(&self, topic: &str, block: Duration, mut probe: F) -> BackendResult<Option<T>>
    where
        F: FnMut(&mut TopicLog) -> BackendResult<Option<T>> + Send,
        T: Send,
    {
        let deadline = Instant::now() + block;
        loop {
            let mut appended = {
                let mut topics = self.lock();
                let log = topics.entry(topic.to_string()).or_insert_with(TopicLog::new);
                if let Some(found) = probe(log)? {
                    return Ok(Some(found));
                }
                log.appended.subscribe()
            };

            if block.is_zero() {
                return Ok(None);
            }
            if tokio::time::timeout_at(deadline, appended.changed()).await.is_err() {
                return Ok(None);
            }
        }
    }
}

#[async_trait]
impl DurableLog for MemoryLog {
    fn name(&self) -> &'static str {
        "MemoryLog"
    }

    async fn append(&self, topic: &str, payload: Bytes, retention_cap: usize) -> BackendResult<EntryId> {
        let mut topics = self.lock();
        let log = topics.entry(topic.to_string()).or_insert_with(TopicLog::new);

        let id = log.last_id.next_after(now_ms());
        log.last_id = id;
        log.entries.push_back(Entry::new(id, payload));

        let mut evicted_pending = 0;
        while log.entries.len() > retention_cap {
            if let Some(evicted) = log.entries.pop_front() {
                evicted_pending += log
                    .groups
                    .values()
                    .filter(|g| g.pending.contains_key(&evicted.id))
                    .count();
            }
        }
        if evicted_pending > 0 {
            tracing::warn!(
                "[MemoryLog] Retention trim on {} evicted {} pending entries; they can no longer be reclaimed",
                topic,
                evicted_pending
            );
        }

        log.appended.send_replace(id);
        Ok(id)
    }

    async fn read_from(&self, topic: &str, cursor: ReadCursor, block: Duration) -> BackendResult<Vec<Entry>> {
        let after = match cursor {
            ReadCursor::Beginning => None,
            ReadCursor::Latest => Some(
                self.lock()
                    .get(topic)
                    .map(|log| log.last_id)
                    .unwrap_or(EntryId::MIN),
            ),
            ReadCursor::After(id) => Some(id),
        };

        let batch = self
            .wait_for(topic, block, |log| {
                let batch: Vec<Entry> = log
                    .entries
                    .iter()
                    .filter(|e| after.map_or(true, |a| e.id > a))
                    .cloned()
                    .collect();
                Ok((!batch.is_empty()).then_some(batch))
            })
            .await?;
        Ok(batch.unwrap_or_default())
    }

    async fn create_group_strict(&self, topic: &str, group: &str, start: ReadCursor) -> BackendResult<()> {
        let mut topics = self.lock();
        let log = topics.entry(topic.to_string()).or_insert_with(TopicLog::new);
        if log.groups.contains_key(group) {
            return Err(BackendError::GroupAlreadyExists {
                group: group.to_string(),
                topic: topic.to_string(),
            });
        }

        let last_delivered = match start {
            ReadCursor::Beginning => EntryId::MIN,
            ReadCursor::Latest => log.last_id,
            ReadCursor::After(id) => id,
        };
        log.groups.insert(
            group.to_string(),
            GroupState {
                last_delivered,
                pending: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn group_read(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
        start: GroupStart,
    ) -> BackendResult<Vec<Entry>> {
        let count = count.max(1);

        match start {
            GroupStart::New => {
                let batch = self
                    .wait_for(topic, block, |log| {
                        let TopicLog { entries, groups, .. } = log;
                        let state = groups
                            .get_mut(group)
                            .ok_or_else(|| no_such_group(topic, group))?;

                        let batch: Vec<Entry> = entries
                            .iter()
                            .filter(|e| e.id > state.last_delivered)
                            .take(count)
                            .cloned()
                            .collect();
                        if batch.is_empty() {
                            return Ok(None);
                        }

                        let now = Instant::now();
                        for entry in &batch {
                            state.last_delivered = entry.id;
                            let record = state.pending.entry(entry.id).or_insert_with(|| PendingRecord {
                                consumer: consumer.to_string(),
                                delivered_at: now,
                                delivery_count: 0,
                            });
                            record.consumer = consumer.to_string();
                            record.delivered_at = now;
                            record.delivery_count += 1;
                        }
                        Ok(Some(batch))
                    })
                    .await?;
                Ok(batch.unwrap_or_default())
            }
            GroupStart::History(after) => {
                let topics = self.lock();
                let log = topics.get(topic).ok_or_else(|| no_such_group(topic, group))?;
                let state = log.groups.get(group).ok_or_else(|| no_such_group(topic, group))?;

                Ok(state
                    .pending
                    .iter()
                    .filter(|(id, record)| **id > after && record.consumer == consumer)
                    .filter_map(|(id, _)| find_entry(&log.entries, *id).cloned())
                    .take(count)
                    .collect())
            }
        }
    }

    async fn ack(&self, topic: &str, group: &str, id: EntryId) -> BackendResult<bool> {
        let mut topics = self.lock();
        Ok(topics
            .get_mut(topic)
            .and_then(|log| log.groups.get_mut(group))
            .map(|state| state.pending.remove(&id).is_some())
            .unwrap_or(false))
    }

    async fn pending_range(&self, topic: &str, group: &str, range: PendingRange) -> BackendResult<Vec<PendingEntry>> {
        let topics = self.lock();
        let state = topics
            .get(topic)
            .and_then(|log| log.groups.get(group))
            .ok_or_else(|| no_such_group(topic, group))?;

        if range.min > range.max {
            return Ok(Vec::new());
        }

        let now = Instant::now();
        Ok(state
            .pending
            .range(range.min..=range.max)
            .take(range.count)
            .map(|(id, record)| PendingEntry {
                id: *id,
                consumer: record.consumer.clone(),
                idle_ms: now.saturating_duration_since(record.delivered_at).as_millis() as u64,
                delivery_count: record.delivery_count,
            })
            .collect())
    }

    async fn reclaim(&self, topic: &str, group: &str, consumer: &str, min_idle: Duration) -> BackendResult<Vec<Entry>> {
        let mut topics = self.lock();
        let log = topics.get_mut(topic).ok_or_else(|| no_such_group(topic, group))?;
        let TopicLog { entries, groups, .. } = log;
        let state = groups.get_mut(group).ok_or_else(|| no_such_group(topic, group))?;

        let now = Instant::now();
        let idle: Vec<EntryId> = state
            .pending
            .iter()
            .filter(|(_, record)| now.saturating_duration_since(record.delivered_at) >= min_idle)
            .map(|(id, _)| *id)
            .take(RECLAIM_BATCH)
            .collect();

        let mut claimed = Vec::with_capacity(idle.len());
        for id in idle {
            match (find_entry(entries, id), state.pending.get_mut(&id)) {
                (Some(entry), Some(record)) => {
                    record.consumer = consumer.to_string();
                    record.delivered_at = now;
                    record.delivery_count += 1;
                    claimed.push(entry.clone());
                }
                _ => {
                    state.pending.remove(&id);
                    tracing::warn!(
                        "[MemoryLog] Pending entry {} on {}/{} was trimmed before it could be reclaimed",
                        id,
                        topic,
                        group
                    );
                }
            }
        }
        Ok(claimed)
    }

    async fn last_id(&self, topic: &str) -> BackendResult<Option<EntryId>> {
        Ok(self
            .lock()
            .get(topic)
            .map(|log| log.last_id)
            .filter(|id| *id != EntryId::MIN))
    }

    async fn len(&self, topic: &str) -> BackendResult<usize> {
        Ok(self.lock().get(topic).map(|log| log.entries.len()).unwrap_or(0))
    }
}
