/**
 * Durable Log Contract
 *
 * This module defines the `DurableLog` trait: an append-only, per-topic
 * log with bounded retention, tailing reads and consumer groups with
 * acknowledgment and pending-entry tracking.
 *
 * # Implementations
 *
 * - `MemoryLog` - in-process, for tests and single-node deployments
 * - `RedisStreamLog` - Redis Streams over a network connection
 *
 * # Blocking Reads
 *
 * `read_from` and `group_read` take a `block` timeout. When nothing is
 * available before the timeout they return an empty batch, never an error.
 * This is the natural cancellation checkpoint of every reading loop.
 *
 * # Retention
 *
 * `append` trims each topic to `retention_cap` entries by count. Trimming
 * does not protect entries that are still pending in a consumer group; a
 * pending entry evicted this way can no longer be reclaimed.
 */

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::backend::error::{BackendError, BackendResult};
use crate::shared::entry::{Entry, EntryId, PendingEntry};

/// Upper bound on entries moved by one `reclaim` call
pub const RECLAIM_BATCH: usize = 100;

/// Decode an entry's payload, reporting failures as `DecodeError`
pub fn decode_entry<T: DeserializeOwned>(entry: &Entry) -> BackendResult<T> {
    entry
        .decode()
        .map_err(|e| BackendError::decode(entry.id, e.to_string()))
}

/// Where a tailing read (or a new group) starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCursor {
    /// Every retained entry (`"0"`)
    Beginning,
    /// Only entries appended after the call (`"$"`)
    Latest,
    /// Entries with an id greater than the given one
    After(EntryId),
}

impl ReadCursor {
    /// Cursor for the next read after a batch ending at `last`
    pub fn advance(self, last: Option<EntryId>) -> Self {
        match last {
            Some(id) => Self::After(id),
            None => self,
        }
    }
}

/// What a group read delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStart {
    /// Entries never delivered to the group (`">"`)
    New,
    /// This consumer's own pending entries with an id greater than the given one
    History(EntryId),
}

/// Bounds of a pending-entry inspection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRange {
    /// Smallest id included (`"-"` when `EntryId::MIN`)
    pub min: EntryId,
    /// Largest id included (`"+"` when `EntryId::MAX`)
    pub max: EntryId,
    /// Maximum entries returned
    pub count: usize,
}

impl Default for PendingRange {
    fn default() -> Self {
        Self {
            min: EntryId::MIN,
            max: EntryId::MAX,
            count: 10,
        }
    }
}

impl PendingRange {
    pub fn with_count(count: usize) -> Self {
        Self {
            count,
            ..Self::default()
        }
    }
}

/// Append-only, replayable, consumer-group-capable log
#[async_trait]
pub trait DurableLog: Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Append a payload, trimming the topic to `retention_cap` entries
    async fn append(&self, topic: &str, payload: Bytes, retention_cap: usize)
        -> BackendResult<EntryId>;

    /// Entries after `cursor`, waiting up to `block` for new ones
    async fn read_from(
        &self,
        topic: &str,
        cursor: ReadCursor,
        block: Duration,
    ) -> BackendResult<Vec<Entry>>;

    /// Create a consumer group; fails with `GroupAlreadyExists` if present
    async fn create_group_strict(
        &self,
        topic: &str,
        group: &str,
        start: ReadCursor,
    ) -> BackendResult<()>;

    /// Deliver up to `count` entries to `consumer`, recording them as pending
    async fn group_read(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        block: Duration,
        count: usize,
        start: GroupStart,
    ) -> BackendResult<Vec<Entry>>;

    /// Acknowledge an entry; returns whether a pending record was removed
    async fn ack(&self, topic: &str, group: &str, id: EntryId) -> BackendResult<bool>;

    /// Inspect pending entries without side effects
    async fn pending_range(
        &self,
        topic: &str,
        group: &str,
        range: PendingRange,
    ) -> BackendResult<Vec<PendingEntry>>;

    /// Move pending entries idle for at least `min_idle` to `consumer`
    async fn reclaim(
        &self,
        topic: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
    ) -> BackendResult<Vec<Entry>>;

    /// Id of the newest retained entry
    async fn last_id(&self, topic: &str) -> BackendResult<Option<EntryId>>;

    /// Number of retained entries
    async fn len(&self, topic: &str) -> BackendResult<usize>;

    /// Create a consumer group, treating an existing group as success
    async fn create_group(&self, topic: &str, group: &str, start: ReadCursor) -> BackendResult<()> {
        match self.create_group_strict(topic, group, start).await {
            Ok(()) => {
                tracing::info!(
                    "[{}] Created consumer group {} on {}",
                    self.name(),
                    group,
                    topic
                );
                Ok(())
            }
            Err(BackendError::GroupAlreadyExists { .. }) => {
                tracing::debug!("[{}] Consumer group {} already exists on {}", self.name(), group, topic);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
