//! Tailing reader over a topic
//!
//! Wraps `read_from` with a cursor that advances to the last id of every
//! batch. A `Latest` start is pinned to the newest existing id on the first
//! read, so entries appended between two reads are never skipped.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::error::BackendResult;
use crate::backend::stream::log::{DurableLog, ReadCursor};
use crate::shared::entry::Entry;

pub struct TailReader {
    log: Arc<dyn DurableLog>,
    topic: String,
    cursor: ReadCursor,
    block: Duration,
}

impl TailReader {
    pub fn new(log: Arc<dyn DurableLog>, topic: impl Into<String>, start: ReadCursor, block: Duration) -> Self {
        Self {
            log,
            topic: topic.into(),
            cursor: start,
            block,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn cursor(&self) -> ReadCursor {
        self.cursor
    }

    /// Whether reads wait for new entries
    pub fn blocks(&self) -> bool {
        !self.block.is_zero()
    }

    /// Pin a `Latest` cursor to the newest existing entry
    pub async fn prime(&mut self) -> BackendResult<()> {
        if self.cursor == ReadCursor::Latest {
            self.cursor = match self.log.last_id(&self.topic).await? {
                Some(id) => ReadCursor::After(id),
                None => ReadCursor::Beginning,
            };
        }
        Ok(())
    }

    /// Next batch of entries, empty when the block timeout elapsed
    pub async fn next_batch(&mut self) -> BackendResult<Vec<Entry>> {
        self.prime().await?;

        let batch = self.log.read_from(&self.topic, self.cursor, self.block).await?;
        self.cursor = self.cursor.advance(batch.last().map(|e| e.id));
        Ok(batch)
    }
}
