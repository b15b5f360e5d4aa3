//! Configuration fixtures and polling helpers

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use streamcast::backend::error::BackendError;
use streamcast::backend::stream::EventHandler;
use streamcast::shared::config::{AppConfig, BroadcasterKind};

/// Upper bound for anything that should arrive "promptly"
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Single-instance configuration for `topics`
pub fn loopback_config(topics: &[&str]) -> AppConfig {
    AppConfig::builder()
        .broadcaster(BroadcasterKind::Loopback)
        .topics(topics.iter().copied())
        .block(Duration::from_millis(50))
        .retry_delay(Duration::from_millis(20))
        .drain_timeout(Duration::from_secs(2))
        .build()
        .expect("loopback config is valid")
}

/// Durable configuration for `topics` with short block and retry times
pub fn durable_config(topics: &[&str]) -> AppConfig {
    AppConfig::builder()
        .broadcaster(BroadcasterKind::Durable)
        .topics(topics.iter().copied())
        .block(Duration::from_millis(50))
        .retry_delay(Duration::from_millis(20))
        .drain_timeout(Duration::from_secs(2))
        .build()
        .expect("durable config is valid")
}

/// Redis URL for the tests marked `#[ignore]`
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string())
}

/// Poll `check` until it returns true, panicking after `within`
pub async fn wait_until<F, Fut>(within: Duration, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + within;
    while !check().await {
        if tokio::time::Instant::now() >= deadline {
            panic!("Condition not met within {:?}", within);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Events recorded by [`collecting_handler`]
pub type Seen = Arc<Mutex<Vec<Value>>>;

/// Handler that records every event it is given and always succeeds
pub fn collecting_handler() -> (Arc<dyn EventHandler>, Seen) {
    let seen: Seen = Arc::default();
    let sink = seen.clone();
    let handler = move |event: Value| {
        let sink = sink.clone();
        async move {
            sink.lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(event);
            Ok::<_, BackendError>(())
        }
    };
    let handler: Arc<dyn EventHandler> = Arc::new(handler);
    (handler, seen)
}

pub fn snapshot(seen: &Seen) -> Vec<Value> {
    seen.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}
