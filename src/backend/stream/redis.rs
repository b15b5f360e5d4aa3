/**
 * Redis Streams Log
 *
 * `RedisStreamLog` implements [`DurableLog`] on top of Redis Streams:
 *
 * - `append` -> `XADD <topic> MAXLEN <cap> * data <payload>`
 * - `read_from` -> `XREAD [BLOCK ms] STREAMS <topic> <cursor>`
 * - `create_group_strict` -> `XGROUP CREATE <topic> <group> <start> MKSTREAM`
 * - `group_read` -> `XREADGROUP GROUP <group> <consumer> COUNT n [BLOCK ms] STREAMS <topic> >|<id>`
 * - `ack` -> `XACK`
 * - `pending_range` -> `XPENDING <topic> <group> <min> <max> <count>`
 * - `reclaim` -> `XPENDING` + `XCLAIM`
 *
 * # Connections
 *
 * Non-blocking commands share one `ConnectionManager`, which reconnects on
 * its own. Blocking reads park a connection for up to the block timeout, so
 * they check out a dedicated multiplexed connection from a small idle pool
 * and return it afterwards. A connection that failed is dropped instead of
 * returned.
 */

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamClaimReply, StreamId, StreamPendingCountReply, StreamRangeReply, StreamReadReply};
use redis::RedisError;
use tokio::sync::Mutex;

use crate::backend::error::{BackendError, BackendResult};
use crate::backend::stream::log::{DurableLog, GroupStart, PendingRange, ReadCursor, RECLAIM_BATCH};
use crate::shared::config::AppConfig;
use crate::shared::entry::{Entry, EntryId, PendingEntry};

/// Stream field holding the payload
const PAYLOAD_FIELD: &str = "data";

/// Idle blocking connections kept for reuse
const MAX_IDLE_BLOCKING: usize = 8;

/// [`DurableLog`] backed by Redis Streams
pub struct RedisStreamLog {
    client: redis::Client,
    manager: ConnectionManager,
    blocking: Mutex<Vec<MultiplexedConnection>>,
    slow_append: Duration,
}

impl RedisStreamLog {
    /// Connect to Redis at `url`
    pub async fn connect(url: &str, slow_append: Duration) -> BackendResult<Self> {
        let client = redis::Client::open(url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        tracing::info!(
            "[RedisStreamLog] Connected to {}",
            client.get_connection_info().addr
        );

        Ok(Self {
            client,
            manager,
            blocking: Mutex::new(Vec::new()),
            slow_append,
        })
    }

    pub async fn from_config(config: &AppConfig) -> BackendResult<Self> {
        Self::connect(&config.redis.connection_url(), config.slow_append()).await
    }

    fn conn(&self) -> ConnectionManager {
        self.manager.clone()
    }

    async fn checkout(&self) -> Result<MultiplexedConnection, RedisError> {
        if let Some(conn) = self.blocking.lock().await.pop() {
            return Ok(conn);
        }
        tracing::debug!("[RedisStreamLog] Opening blocking connection");
        self.client.get_multiplexed_async_connection().await
    }

    async fn checkin(&self, conn: MultiplexedConnection) {
        let mut pool = self.blocking.lock().await;
        if pool.len() < MAX_IDLE_BLOCKING {
            pool.push(conn);
        }
    }

    /// Run a blocking command on a checked-out connection
    async fn blocking_query<T: redis::FromRedisValue>(&self, cmd: redis::Cmd) -> Result<T, RedisError> {
        let mut conn = self.checkout().await?;
        let reply: T = cmd.query_async(&mut conn).await?;
        self.checkin(conn).await;
        Ok(reply)
    }
}

fn cursor_arg(cursor: ReadCursor) -> String {
    match cursor {
        ReadCursor::Beginning => "0".to_string(),
        ReadCursor::Latest => "$".to_string(),
        ReadCursor::After(id) => id.to_string(),
    }
}

/// `BLOCK` milliseconds; `BLOCK 0` would wait forever
fn block_arg(block: Duration) -> u64 {
    (block.as_millis() as u64).max(1)
}

fn range_args(range: &PendingRange) -> (String, String) {
    let min = if range.min == EntryId::MIN {
        "-".to_string()
    } else {
        range.min.to_string()
    };
    let max = if range.max == EntryId::MAX {
        "+".to_string()
    } else {
        range.max.to_string()
    };
    (min, max)
}

fn map_group_error(err: RedisError, topic: &str, group: &str) -> BackendError {
    match err.code() {
        Some("NOGROUP") => BackendError::NoSuchGroup {
            group: group.to_string(),
            topic: topic.to_string(),
        },
        Some("BUSYGROUP") => BackendError::GroupAlreadyExists {
            group: group.to_string(),
            topic: topic.to_string(),
        },
        _ => err.into(),
    }
}

fn to_entry(stream_id: &StreamId) -> BackendResult<Entry> {
    let id: EntryId = stream_id.id.parse()?;
    let payload: Vec<u8> = stream_id.get(PAYLOAD_FIELD).unwrap_or_default();
    Ok(Entry::new(id, Bytes::from(payload)))
}

fn to_entries(reply: Option<StreamReadReply>) -> BackendResult<Vec<Entry>> {
    let keys = reply.map(|reply| reply.keys).unwrap_or_default();
    keys.iter()
        .flat_map(|key| key.ids.iter())
        .map(to_entry)
        .collect()
}

#[async_trait]
impl DurableLog for RedisStreamLog {
    fn name(&self) -> &'static str {
        "RedisStreamLog"
    }

    async fn append(&self, topic: &str, payload: Bytes, retention_cap: usize) -> BackendResult<EntryId> {
        let started = Instant::now();
        let id: String = redis::cmd("XADD")
            .arg(topic)
            .arg("MAXLEN")
            .arg(retention_cap)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload.as_ref())
            .query_async(&mut self.conn())
            .await?;

        let elapsed = started.elapsed();
        if elapsed > self.slow_append {
            tracing::warn!(
                "[RedisStreamLog] Slow append to {}: {:?} (threshold {:?})",
                topic,
                elapsed,
                self.slow_append
            );
        }
        Ok(id.parse()?)
    }

    async fn read_from(&self, topic: &str, cursor: ReadCursor, block: Duration) -> BackendResult<Vec<Entry>> {
        let mut cmd = redis::cmd("XREAD");
        if !block.is_zero() {
            cmd.arg("BLOCK").arg(block_arg(block));
        }
        cmd.arg("STREAMS").arg(topic).arg(cursor_arg(cursor));

        let reply: Option<StreamReadReply> = if block.is_zero() {
            cmd.query_async(&mut self.conn()).await?
        } else {
            self.blocking_query(cmd).await?
        };
        to_entries(reply)
    }

    async fn create_group_strict(&self, topic: &str, group: &str, start: ReadCursor) -> BackendResult<()> {
        let result: Result<(), RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(topic)
            .arg(group)
            .arg(cursor_arg(start))
            .arg("MKSTREAM")
            .query_async(&mut self.conn())
            .await;
        result.map_err(|e| map_group_error(e, topic, group))
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
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer).arg("COUNT").arg(count.max(1));

        let (blocks, start_arg) = match start {
            GroupStart::New => (!block.is_zero(), ">".to_string()),
            // history reads never block
            GroupStart::History(after) => (false, after.to_string()),
        };
        if blocks {
            cmd.arg("BLOCK").arg(block_arg(block));
        }
        cmd.arg("STREAMS").arg(topic).arg(start_arg);

        let reply: Result<Option<StreamReadReply>, RedisError> = if blocks {
            self.blocking_query(cmd).await
        } else {
            cmd.query_async(&mut self.conn()).await
        };
        to_entries(reply.map_err(|e| map_group_error(e, topic, group))?)
    }

    async fn ack(&self, topic: &str, group: &str, id: EntryId) -> BackendResult<bool> {
        let removed: i64 = redis::cmd("XACK")
            .arg(topic)
            .arg(group)
            .arg(id.to_string())
            .query_async(&mut self.conn())
            .await?;
        Ok(removed > 0)
    }

    async fn pending_range(&self, topic: &str, group: &str, range: PendingRange) -> BackendResult<Vec<PendingEntry>> {
        let (min, max) = range_args(&range);
        let reply: Result<StreamPendingCountReply, RedisError> = redis::cmd("XPENDING")
            .arg(topic)
            .arg(group)
            .arg(min)
            .arg(max)
            .arg(range.count)
            .query_async(&mut self.conn())
            .await;
        let reply = reply.map_err(|e| map_group_error(e, topic, group))?;

        reply
            .ids
            .into_iter()
            .map(|p| {
                Ok(PendingEntry {
                    id: p.id.parse()?,
                    consumer: p.consumer,
                    idle_ms: p.last_delivered_ms as u64,
                    delivery_count: p.times_delivered as u64,
                })
            })
            .collect()
    }

    async fn reclaim(&self, topic: &str, group: &str, consumer: &str, min_idle: Duration) -> BackendResult<Vec<Entry>> {
        let min_idle_ms = min_idle.as_millis() as u64;
        let idle: Vec<EntryId> = self
            .pending_range(topic, group, PendingRange::with_count(RECLAIM_BATCH))
            .await?
            .into_iter()
            .filter(|p| p.idle_ms >= min_idle_ms)
            .map(|p| p.id)
            .collect();
        if idle.is_empty() {
            return Ok(Vec::new());
        }

        let mut cmd = redis::cmd("XCLAIM");
        cmd.arg(topic).arg(group).arg(consumer).arg(min_idle_ms);
        for id in &idle {
            cmd.arg(id.to_string());
        }
        let reply: StreamClaimReply = cmd
            .query_async(&mut self.conn())
            .await
            .map_err(|e| map_group_error(e, topic, group))?;

        if reply.ids.len() < idle.len() {
            tracing::warn!(
                "[RedisStreamLog] Reclaimed {} of {} idle entries on {}/{}; the rest were trimmed or taken",
                reply.ids.len(),
                idle.len(),
                topic,
                group
            );
        }
        reply.ids.iter().map(to_entry).collect()
    }

    async fn last_id(&self, topic: &str) -> BackendResult<Option<EntryId>> {
        let reply: StreamRangeReply = redis::cmd("XREVRANGE")
            .arg(topic)
            .arg("+")
            .arg("-")
            .arg("COUNT")
            .arg(1)
            .query_async(&mut self.conn())
            .await?;
        match reply.ids.first() {
            Some(newest) => Ok(Some(newest.id.parse()?)),
            None => Ok(None),
        }
    }

    async fn len(&self, topic: &str) -> BackendResult<usize> {
        let len: usize = redis::cmd("XLEN")
            .arg(topic)
            .query_async(&mut self.conn())
            .await?;
        Ok(len)
    }
}
