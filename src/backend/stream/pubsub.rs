/**
 * Producer / Subscriber API
 *
 * Thin application-facing layer over a [`DurableLog`]:
 *
 * - [`EventPublisher::publish`] appends a JSON payload to a topic
 * - [`EventPublisher::group_publish`] does the same after making sure the
 *   consumer group exists, so nothing published is lost to a late reader
 * - [`EventSubscriber::subscribe`] tails a topic from "now" and hands every
 *   payload to a handler (fan-out, every subscriber sees every entry)
 * - [`EventSubscriber::group_subscribe`] runs a consumer group delivery loop
 *   (load-balanced, acknowledged)
 * - [`EventSubscriber::check_pending_and_claim`] runs the reclaim loop that
 *   redelivers entries left pending by dead or failing consumers
 *
 * [`EventSubscriber::from_config`] takes read, retry and reclaim timings
 * from [`AppConfig`].
 *
 * Subscriptions are background tasks spawned through the shared
 * [`TaskTracker`]; the subscribe calls return once the task is running.
 */

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;

use crate::backend::error::BackendResult;
use crate::backend::shutdown::{Shutdown, TaskTracker};
use crate::backend::stream::log::{decode_entry, DurableLog, ReadCursor};
use crate::backend::stream::reader::{ConsumerGroupReader, EventHandler, ReaderOptions, ReclaimOptions};
use crate::backend::stream::tail::TailReader;
use crate::shared::config::AppConfig;
use crate::shared::entry::{encode_payload, EntryId};

#[derive(Clone)]
pub struct EventPublisher {
    log: Arc<dyn DurableLog>,
    retention_cap: usize,
}

impl EventPublisher {
    pub fn new(log: Arc<dyn DurableLog>, retention_cap: usize) -> Self {
        Self { log, retention_cap }
    }

    pub fn from_config(log: Arc<dyn DurableLog>, config: &AppConfig) -> Self {
        Self::new(log, config.retention_cap)
    }

    /// Append `value` as JSON to `topic`
    pub async fn publish<T: Serialize + ?Sized>(&self, topic: &str, value: &T) -> BackendResult<EntryId> {
        let payload = encode_payload(value)?;
        let id = self.log.append(topic, payload, self.retention_cap).await?;
        tracing::debug!("[Publisher] Published {} to {}", id, topic);
        Ok(id)
    }

    /// Ensure `group` exists on `topic`, then publish
    pub async fn group_publish<T: Serialize + ?Sized>(
        &self,
        group: &str,
        topic: &str,
        value: &T,
    ) -> BackendResult<EntryId> {
        self.log.create_group(topic, group, ReadCursor::Beginning).await?;
        self.publish(topic, value).await
    }
}

pub struct EventSubscriber {
    log: Arc<dyn DurableLog>,
    tracker: Arc<TaskTracker>,
    options: ReaderOptions,
    reclaim: ReclaimOptions,
}

impl EventSubscriber {
    pub fn new(log: Arc<dyn DurableLog>, tracker: Arc<TaskTracker>, options: ReaderOptions) -> Self {
        Self {
            log,
            tracker,
            options,
            reclaim: ReclaimOptions::default(),
        }
    }

    /// Subscriber using the configured block, retry and reclaim settings
    pub fn from_config(log: Arc<dyn DurableLog>, tracker: Arc<TaskTracker>, config: &AppConfig) -> Self {
        Self::new(log, tracker, ReaderOptions::from_config(config))
            .with_reclaim(ReclaimOptions::from_config(config))
    }

    /// Replace the settings used by [`EventSubscriber::check_pending_and_claim`]
    pub fn with_reclaim(mut self, reclaim: ReclaimOptions) -> Self {
        self.reclaim = reclaim;
        self
    }

    pub fn reclaim_options(&self) -> &ReclaimOptions {
        &self.reclaim
    }

    /// Tail `topic` from its current end, calling `handler` for every payload
    ///
    /// Everything appended after this call returns is delivered.
    pub async fn subscribe(&self, handler: Arc<dyn EventHandler>, topic: &str) -> BackendResult<()> {
        let mut tail = TailReader::new(self.log.clone(), topic, ReadCursor::Latest, self.options.block);
        tail.prime().await?;

        tracing::info!("[Subscriber] Tailing {}", topic);
        self.tracker.spawn(
            "tail-subscriber",
            tail_loop(tail, handler, self.options.retry_delay, self.tracker.signal()),
        );
        Ok(())
    }

    /// Join `group` on `topic` as `consumer` and start the delivery loop
    pub async fn group_subscribe(
        &self,
        handler: Arc<dyn EventHandler>,
        group: &str,
        topic: &str,
        consumer: &str,
    ) -> BackendResult<Arc<ConsumerGroupReader>> {
        let reader = Arc::new(ConsumerGroupReader::new(
            self.log.clone(),
            topic,
            group,
            consumer,
            handler,
            self.options.clone(),
        ));
        reader.ensure_group().await?;

        self.tracker
            .spawn("group-reader", reader.clone().run(self.tracker.signal()));
        Ok(reader)
    }

    /// Start the reclaim loop for `consumer` in `group`
    pub fn check_pending_and_claim(
        &self,
        handler: Arc<dyn EventHandler>,
        group: &str,
        topic: &str,
        consumer: &str,
    ) -> Arc<ConsumerGroupReader> {
        let options = self.reclaim.clone();
        let reader = Arc::new(ConsumerGroupReader::new(
            self.log.clone(),
            topic,
            group,
            consumer,
            handler,
            self.options.clone(),
        ));

        tracing::info!(
            "[Subscriber] Reclaiming entries idle for {:?} on {}/{} every {:?}",
            options.min_idle,
            topic,
            group,
            options.interval
        );
        self.tracker.spawn(
            "reclaim-loop",
            reader.clone().run_reclaim(options, self.tracker.signal()),
        );
        reader
    }
}

async fn tail_loop(mut tail: TailReader, handler: Arc<dyn EventHandler>, retry_delay: Duration, mut shutdown: Shutdown) {
    while !shutdown.is_triggered() {
        match tail.next_batch().await {
            Ok(batch) if batch.is_empty() => {
                if !tail.blocks() && !shutdown.sleep(retry_delay).await {
                    break;
                }
            }
            Ok(batch) => {
                for entry in batch {
                    let event: Value = match decode_entry(&entry) {
                        Ok(event) => event,
                        Err(e) => {
                            tracing::warn!("[Subscriber] Skipping entry on {}: {}", tail.topic(), e);
                            continue;
                        }
                    };
                    if let Err(e) = handler.handle(event).await {
                        tracing::warn!("[Subscriber] Handler failed for {} on {}: {}", entry.id, tail.topic(), e);
                    }
                }
            }
            Err(e) => {
                tracing::warn!("[Subscriber] Read on {} failed: {}", tail.topic(), e);
                if !shutdown.sleep(retry_delay).await {
                    break;
                }
            }
        }
    }
    tracing::debug!("[Subscriber] Tail of {} stopped", tail.topic());
}
