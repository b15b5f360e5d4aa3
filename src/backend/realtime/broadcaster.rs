/**
 * Topic Broadcaster
 *
 * A `Broadcaster` decouples the code that produces messages for a topic
 * (websocket handlers) from the code that consumes them (the fan-out loop).
 * Producers call `send`, the single consumer calls `receive`.
 *
 * # Strategies
 *
 * - **Loopback** - a pump moves outbound messages straight to inbound.
 *   Single process, nothing is persisted.
 * - **Durable** - a publish pump appends outbound messages to the durable
 *   log; a tail pump reads the topic back from the log into inbound. Every
 *   instance tails the same topic, so every instance receives every message
 *   (fan-out, not load-balancing).
 *
 * # Queues
 *
 * Both queues are bounded by `queue_capacity`. `send` waits for room,
 * `try_send` fails fast with `QueueFull`. Once shutdown begins the publish
 * pump stops taking new messages and appends what is already queued before
 * it exits.
 *
 * # Failure Handling
 *
 * Pump errors are logged and never surface to `send` callers. A failed
 * append drops that message. Entries whose payload is not valid JSON are
 * skipped by the tail pump, so `receive` only yields well-formed values.
 */

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};

use crate::backend::error::{BackendError, BackendResult};
use crate::backend::shutdown::{Shutdown, TaskTracker};
use crate::backend::stream::{decode_entry, DurableLog, ReadCursor, TailReader};
use crate::shared::config::{AppConfig, BroadcasterKind, ConfigError};
use crate::shared::entry::encode_payload;

/// Settings of the durable strategy
#[derive(Debug, Clone)]
pub struct DurableOptions {
    pub retention_cap: usize,
    pub block: Duration,
    pub retry_delay: Duration,
}

impl Default for DurableOptions {
    fn default() -> Self {
        Self {
            retention_cap: 1000,
            block: Duration::from_millis(200),
            retry_delay: Duration::from_millis(200),
        }
    }
}

impl DurableOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            retention_cap: config.retention_cap,
            block: config.block_timeout(),
            retry_delay: config.retry_delay(),
        }
    }
}

#[derive(Debug)]
pub struct Broadcaster {
    topic: String,
    kind: BroadcasterKind,
    outbound: mpsc::Sender<Value>,
    inbound: Mutex<mpsc::Receiver<Value>>,
}

impl Broadcaster {
    /// Outbound forwarded straight to inbound
    pub fn loopback(topic: impl Into<String>, capacity: usize, tracker: &TaskTracker) -> Self {
        let topic = topic.into();
        let (outbound, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound) = mpsc::channel(capacity);

        tracker.spawn(
            "loopback-pump",
            loopback_pump(topic.clone(), outbound_rx, inbound_tx, tracker.signal()),
        );
        tracing::info!("[Broadcaster] {}: loopback strategy", topic);

        Self {
            topic,
            kind: BroadcasterKind::Loopback,
            outbound,
            inbound: Mutex::new(inbound),
        }
    }

    /// Outbound appended to `log`, inbound tailed from it
    pub async fn durable(
        topic: impl Into<String>,
        capacity: usize,
        log: Arc<dyn DurableLog>,
        options: DurableOptions,
        tracker: &TaskTracker,
    ) -> Self {
        let topic = topic.into();
        let (outbound, outbound_rx) = mpsc::channel(capacity);
        let (inbound_tx, inbound) = mpsc::channel(capacity);

        let mut tail = TailReader::new(log.clone(), topic.clone(), ReadCursor::Latest, options.block);
        if let Err(e) = tail.prime().await {
            // the tail pump retries on its first read
            tracing::warn!("[Broadcaster] {}: could not resolve tail position yet: {}", topic, e);
        }

        tracker.spawn(
            "publish-pump",
            publish_pump(
                topic.clone(),
                outbound_rx,
                log.clone(),
                options.retention_cap,
                tracker.signal(),
            ),
        );
        tracker.spawn(
            "tail-pump",
            tail_pump(tail, inbound_tx, options.retry_delay, tracker.signal()),
        );
        tracing::info!(
            "[Broadcaster] {}: durable strategy on {} (retention {})",
            topic,
            log.name(),
            options.retention_cap
        );

        Self {
            topic,
            kind: BroadcasterKind::Durable,
            outbound,
            inbound: Mutex::new(inbound),
        }
    }

    /// Build the strategy selected by `config`
    ///
    /// The durable strategy requires `log`.
    pub async fn from_config(
        topic: impl Into<String>,
        config: &AppConfig,
        log: Option<Arc<dyn DurableLog>>,
        tracker: &TaskTracker,
    ) -> BackendResult<Self> {
        match (config.broadcaster, log) {
            (BroadcasterKind::Loopback, _) => Ok(Self::loopback(topic, config.queue_capacity, tracker)),
            (BroadcasterKind::Durable, Some(log)) => Ok(Self::durable(
                topic,
                config.queue_capacity,
                log,
                DurableOptions::from_config(config),
                tracker,
            )
            .await),
            (BroadcasterKind::Durable, None) => Err(ConfigError::MissingValue("durable log").into()),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn kind(&self) -> BroadcasterKind {
        self.kind
    }

    /// Enqueue a message, waiting while the queue is full
    pub async fn send(&self, message: Value) -> BackendResult<()> {
        self.outbound.send(message).await.map_err(|_| BackendError::QueueClosed {
            topic: self.topic.clone(),
        })
    }

    /// Enqueue a message without waiting
    pub fn try_send(&self, message: Value) -> BackendResult<()> {
        self.outbound.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => BackendError::QueueFull {
                topic: self.topic.clone(),
            },
            TrySendError::Closed(_) => BackendError::QueueClosed {
                topic: self.topic.clone(),
            },
        })
    }

    /// Next inbound message, `None` once the pumps are gone
    pub async fn receive(&self) -> Option<Value> {
        self.inbound.lock().await.recv().await
    }
}

/// Forward one message, giving up on shutdown or a closed receiver
async fn forward(tx: &mpsc::Sender<Value>, message: Value, shutdown: &mut Shutdown) -> bool {
    tokio::select! {
        sent = tx.send(message) => sent.is_ok(),
        _ = shutdown.wait() => false,
    }
}

async fn loopback_pump(
    topic: String,
    mut outbound: mpsc::Receiver<Value>,
    inbound: mpsc::Sender<Value>,
    mut shutdown: Shutdown,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => return,
            },
        };
        if !forward(&inbound, message, &mut shutdown).await {
            break;
        }
    }

    outbound.close();
    let mut dropped = 0;
    while let Ok(message) = outbound.try_recv() {
        if inbound.try_send(message).is_err() {
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::warn!("[Broadcaster] {}: dropped {} messages at shutdown", topic, dropped);
    }
}

async fn publish_pump(
    topic: String,
    mut outbound: mpsc::Receiver<Value>,
    log: Arc<dyn DurableLog>,
    retention_cap: usize,
    mut shutdown: Shutdown,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.wait() => break,
            message = outbound.recv() => match message {
                Some(message) => message,
                None => return,
            },
        };
        append(&*log, &topic, &message, retention_cap).await;
    }

    outbound.close();
    let mut drained = 0;
    while let Some(message) = outbound.recv().await {
        append(&*log, &topic, &message, retention_cap).await;
        drained += 1;
    }
    tracing::info!("[Broadcaster] {}: drained {} queued messages", topic, drained);
}

async fn append(log: &dyn DurableLog, topic: &str, message: &Value, retention_cap: usize) {
    let payload = match encode_payload(message) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!("[Broadcaster] {}: could not encode message: {}", topic, e);
            return;
        }
    };
    if let Err(e) = log.append(topic, payload, retention_cap).await {
        tracing::error!("[Broadcaster] {}: append failed, message dropped: {}", topic, e);
    }
}

async fn tail_pump(
    mut tail: TailReader,
    inbound: mpsc::Sender<Value>,
    retry_delay: Duration,
    mut shutdown: Shutdown,
) {
    while !shutdown.is_triggered() {
        let batch = match tail.next_batch().await {
            Ok(batch) => batch,
            Err(e) => {
                if e.is_transient() {
                    tracing::warn!("[Broadcaster] {}: tail read failed: {}", tail.topic(), e);
                } else {
                    tracing::error!("[Broadcaster] {}: tail read failed: {}", tail.topic(), e);
                }
                if !shutdown.sleep(retry_delay).await {
                    break;
                }
                continue;
            }
        };

        if batch.is_empty() && !tail.blocks() && !shutdown.sleep(retry_delay).await {
            break;
        }

        for entry in batch {
            let message: Value = match decode_entry(&entry) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("[Broadcaster] {}: skipping entry: {}", tail.topic(), e);
                    continue;
                }
            };
            if !forward(&inbound, message, &mut shutdown).await {
                tracing::debug!("[Broadcaster] {}: tail pump stopped", tail.topic());
                return;
            }
        }
    }
}
