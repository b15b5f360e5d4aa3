/**
 * Consumer Group Reader
 *
 * Drives one consumer of a consumer group: a delivery loop that reads new
 * entries and a reclaim loop that takes over entries other consumers left
 * pending for too long.
 *
 * # States
 *
 * ```text
 * Idle -> Reading -> Delivering -> Acked  -> Reading ...
 *                              \-> Failed -> Reading ...
 * ```
 *
 * An entry is acknowledged only after the handler returned `Ok`. Entries
 * whose payload does not decode, or whose handler failed, stay pending and
 * come back through the reclaim loop once they have been idle for
 * `min_idle`. Delivery is therefore at-least-once.
 *
 * # Cancellation
 *
 * Both loops observe a [`Shutdown`] handle between iterations and while
 * sleeping. A group read is never interrupted mid-flight; its block timeout
 * bounds how long shutdown waits for it.
 */

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::backend::error::{BackendError, BackendResult};
use crate::backend::shutdown::Shutdown;
use crate::backend::stream::log::{decode_entry, DurableLog, GroupStart, PendingRange, ReadCursor};
use crate::shared::config::AppConfig;
use crate::shared::entry::Entry;

/// Receives decoded payloads from a reader or subscriber
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: Value) -> BackendResult<()>;
}

#[async_trait]
impl<F, Fut> EventHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BackendResult<()>> + Send + 'static,
{
    async fn handle(&self, event: Value) -> BackendResult<()> {
        (self)(event).await
    }
}

/// Observable state of a [`ConsumerGroupReader`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Idle,
    Reading,
    Delivering,
    Acked,
    Failed,
    Stopped,
}

/// Delivery loop settings
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// Block timeout of each group read
    pub block: Duration,
    /// Entries requested per group read
    pub count: usize,
    /// Pause after a failed read
    pub retry_delay: Duration,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            block: Duration::from_millis(200),
            count: 1,
            retry_delay: Duration::from_millis(200),
        }
    }
}

impl ReaderOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            block: config.block_timeout(),
            retry_delay: config.retry_delay(),
            ..Self::default()
        }
    }
}

/// Reclaim loop settings
#[derive(Debug, Clone)]
pub struct ReclaimOptions {
    /// Pending window inspected before each reclaim
    pub range: PendingRange,
    /// Minimum idle time before an entry is taken over
    pub min_idle: Duration,
    /// Pause between passes
    pub interval: Duration,
}

impl Default for ReclaimOptions {
    fn default() -> Self {
        Self {
            range: PendingRange::default(),
            min_idle: Duration::from_secs(60),
            interval: Duration::from_secs(60),
        }
    }
}

impl ReclaimOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            range: PendingRange::with_count(config.pending_count),
            min_idle: config.min_idle(),
            interval: config.reclaim_interval(),
        }
    }
}

pub struct ConsumerGroupReader {
    log: Arc<dyn DurableLog>,
    topic: String,
    group: String,
    consumer: String,
    handler: Arc<dyn EventHandler>,
    options: ReaderOptions,
    state: watch::Sender<ReaderState>,
}

impl ConsumerGroupReader {
    pub fn new(
        log: Arc<dyn DurableLog>,
        topic: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        options: ReaderOptions,
    ) -> Self {
        let (state, _) = watch::channel(ReaderState::Idle);
        Self {
            log,
            topic: topic.into(),
            group: group.into(),
            consumer: consumer.into(),
            handler,
            options,
            state,
        }
    }

    pub fn state(&self) -> ReaderState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ReaderState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ReaderState) {
        self.state.send_replace(state);
    }

    /// Create the group at the beginning of the topic if it does not exist yet
    pub async fn ensure_group(&self) -> BackendResult<()> {
        self.log
            .create_group(&self.topic, &self.group, ReadCursor::Beginning)
            .await
    }

    /// One group read followed by delivery of every returned entry
    ///
    /// Returns the number of entries read.
    pub async fn poll_once(&self) -> BackendResult<usize> {
        self.set_state(ReaderState::Reading);
        let entries = self
            .log
            .group_read(
                &self.topic,
                &self.group,
                &self.consumer,
                self.options.block,
                self.options.count,
                GroupStart::New,
            )
            .await?;

        for entry in &entries {
            self.deliver(entry).await;
        }
        Ok(entries.len())
    }

    /// Decode, handle and acknowledge one entry
    ///
    /// Returns whether the entry was acknowledged. Failures are logged and
    /// leave the entry pending.
    pub async fn deliver(&self, entry: &Entry) -> bool {
        self.set_state(ReaderState::Delivering);

        let event: Value = match decode_entry(entry) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(
                    "[Reader] {}/{}: leaving entry pending: {}",
                    self.group,
                    self.consumer,
                    e
                );
                self.set_state(ReaderState::Failed);
                return false;
            }
        };

        if let Err(e) = self.handler.handle(event).await {
            tracing::warn!(
                "[Reader] {}/{}: handler failed for entry {}: {}",
                self.group,
                self.consumer,
                entry.id,
                e
            );
            self.set_state(ReaderState::Failed);
            return false;
        }

        match self.log.ack(&self.topic, &self.group, entry.id).await {
            Ok(_) => {
                tracing::debug!("[Reader] {}/{}: acked {}", self.group, self.consumer, entry.id);
                self.set_state(ReaderState::Acked);
                true
            }
            Err(e) => {
                tracing::warn!(
                    "[Reader] {}/{}: ack of {} failed: {}",
                    self.group,
                    self.consumer,
                    entry.id,
                    e
                );
                self.set_state(ReaderState::Failed);
                false
            }
        }
    }

    /// One reclaim pass: inspect the pending window, claim idle entries and
    /// run them through the handler
    ///
    /// Returns the number of reclaimed entries that were acknowledged.
    pub async fn reclaim_once(&self, options: &ReclaimOptions) -> BackendResult<usize> {
        let pending = self
            .log
            .pending_range(&self.topic, &self.group, options.range)
            .await?;
        if pending.is_empty() {
            return Ok(0);
        }

        let claimed = self
            .log
            .reclaim(&self.topic, &self.group, &self.consumer, options.min_idle)
            .await?;
        if !claimed.is_empty() {
            tracing::info!(
                "[Reader] {}/{}: reclaimed {} idle entries on {}",
                self.group,
                self.consumer,
                claimed.len(),
                self.topic
            );
        }

        let mut acked = 0;
        for entry in &claimed {
            if self.deliver(entry).await {
                acked += 1;
            }
        }
        Ok(acked)
    }

    /// Delivery loop, runs until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: Shutdown) {
        tracing::info!(
            "[Reader] Consumer {} joined group {} on {}",
            self.consumer,
            self.group,
            self.topic
        );
        if let Err(e) = self.ensure_group().await {
            tracing::warn!("[Reader] Could not create group {}: {}", self.group, e);
        }

        while !shutdown.is_triggered() {
            let pause = match self.poll_once().await {
                Ok(0) if self.options.block.is_zero() => Some(self.options.retry_delay),
                Ok(_) => None,
                Err(BackendError::NoSuchGroup { .. }) => {
                    tracing::warn!("[Reader] Group {} vanished from {}, recreating", self.group, self.topic);
                    match self.ensure_group().await {
                        Ok(()) => None,
                        Err(_) => Some(self.options.retry_delay),
                    }
                }
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        "[Reader] Read on {} failed: {}; retrying in {:?}",
                        self.topic,
                        e,
                        self.options.retry_delay
                    );
                    self.set_state(ReaderState::Failed);
                    Some(self.options.retry_delay)
                }
                Err(e) => {
                    tracing::error!(
                        "[Reader] Read on {} failed: {}; retrying in {:?}",
                        self.topic,
                        e,
                        self.options.retry_delay
                    );
                    self.set_state(ReaderState::Failed);
                    Some(self.options.retry_delay)
                }
            };

            if let Some(pause) = pause {
                if !shutdown.sleep(pause).await {
                    break;
                }
            }
        }

        self.set_state(ReaderState::Stopped);
        tracing::info!("[Reader] Consumer {} stopped", self.consumer);
    }

    /// Reclaim loop, one pass per `interval` until shutdown
    pub async fn run_reclaim(self: Arc<Self>, options: ReclaimOptions, mut shutdown: Shutdown) {
        while !shutdown.is_triggered() {
            if let Err(e) = self.reclaim_once(&options).await {
                tracing::warn!("[Reader] Reclaim pass on {} failed: {}", self.topic, e);
            }
            if !shutdown.sleep(options.interval).await {
                break;
            }
        }
        tracing::debug!("[Reader] Reclaim loop for {} stopped", self.consumer);
    }
}
