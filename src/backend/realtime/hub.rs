//! Per-topic wiring
//!
//! A [`TopicHub`] owns the broadcaster and the connection registry of one
//! topic and runs the fan-out loop between them. [`TopicHubs`] holds one hub
//! per configured topic and is shared with the HTTP handlers through
//! `AppState`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::backend::error::{BackendError, BackendResult};
use crate::backend::realtime::broadcaster::Broadcaster;
use crate::backend::realtime::registry::LiveConnectionRegistry;
use crate::backend::shutdown::TaskTracker;
use crate::backend::stream::DurableLog;
use crate::shared::config::AppConfig;

pub struct TopicHub {
    topic: String,
    broadcaster: Arc<Broadcaster>,
    registry: Arc<LiveConnectionRegistry>,
}

impl TopicHub {
    /// Wrap `broadcaster` with a fresh registry and start the fan-out loop
    pub fn start(broadcaster: Broadcaster, tracker: &TaskTracker) -> Arc<Self> {
        let topic = broadcaster.topic().to_string();
        let broadcaster = Arc::new(broadcaster);
        let registry = Arc::new(LiveConnectionRegistry::new(topic.clone()));

        tracker.spawn(
            "fanout-loop",
            registry.clone().fanout_loop(broadcaster.clone(), tracker.signal()),
        );

        Arc::new(Self {
            topic,
            broadcaster,
            registry,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn registry(&self) -> &Arc<LiveConnectionRegistry> {
        &self.registry
    }
}

#[derive(Default)]
pub struct TopicHubs {
    hubs: HashMap<String, Arc<TopicHub>>,
}

impl TopicHubs {
    /// One hub per configured topic, using the configured strategy
    pub async fn from_config(
        config: &AppConfig,
        log: Option<Arc<dyn DurableLog>>,
        tracker: &TaskTracker,
    ) -> BackendResult<Self> {
        let mut hubs = Self::default();
        for topic in &config.topics {
            let broadcaster = Broadcaster::from_config(topic.as_str(), config, log.clone(), tracker).await?;
            hubs.insert(TopicHub::start(broadcaster, tracker));
        }
        Ok(hubs)
    }

    pub fn insert(&mut self, hub: Arc<TopicHub>) {
        self.hubs.insert(hub.topic().to_string(), hub);
    }

    pub fn get(&self, topic: &str) -> BackendResult<Arc<TopicHub>> {
        self.hubs
            .get(topic)
            .cloned()
            .ok_or_else(|| BackendError::unknown_topic(topic))
    }

    pub fn len(&self) -> usize {
        self.hubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }

    /// Live connections per topic
    pub async fn connection_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for (topic, hub) in &self.hubs {
            counts.insert(topic.clone(), hub.registry().len().await);
        }
        counts
    }
}
