/**
 * Live Connection Registry
 *
 * Tracks the live connections of one topic and fans every message the
 * topic's broadcaster yields out to all of them.
 *
 * # Fan-out Rounds
 *
 * Each round works on a snapshot of the registered connections. The lock is
 * held only while copying the snapshot; sends happen outside it, so
 * `accept` and `remove` never wait for a slow client. Sends within a round
 * run concurrently and each is bounded by `send_timeout`.
 *
 * A failed or timed-out send is logged and counted. It never removes the
 * connection and never stops the round or the loop; connections leave the
 * registry only through `remove`, when their socket closes.
 */

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::realtime::broadcaster::Broadcaster;
use crate::backend::realtime::connection::{ConnectionId, LiveConnection};
use crate::backend::shutdown::Shutdown;

/// Default upper bound on one send to one connection
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one fan-out round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct LiveConnectionRegistry {
    topic: String,
    connections: RwLock<Vec<Arc<dyn LiveConnection>>>,
    send_timeout: Duration,
}

impl LiveConnectionRegistry {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            connections: RwLock::new(Vec::new()),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    pub fn with_send_timeout(mut self, send_timeout: Duration) -> Self {
        self.send_timeout = send_timeout;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Register a connection; returns `false` if it was already registered
    pub async fn accept(&self, connection: Arc<dyn LiveConnection>) -> bool {
        let mut connections = self.connections.write().await;
        if connections.iter().any(|c| c.id() == connection.id()) {
            return false;
        }
        connections.push(connection);
        tracing::info!(
            "[Registry] {}: connection accepted ({} clients)",
            self.topic,
            connections.len()
        );
        true
    }

    /// Unregister a connection; returns whether it was registered
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.write().await;
        let before = connections.len();
        connections.retain(|c| c.id() != id);
        let removed = connections.len() < before;
        if removed {
            tracing::info!(
                "[Registry] {}: connection {} removed ({} clients)",
                self.topic,
                id,
                connections.len()
            );
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.connections.read().await.iter().any(|c| c.id() == id)
    }

    pub async fn snapshot(&self) -> Vec<Arc<dyn LiveConnection>> {
        self.connections.read().await.clone()
    }

    /// One fan-out round to every currently registered connection
    pub async fn broadcast(&self, message: &Value) -> FanoutReport {
        let targets = self.snapshot().await;
        let sends = targets.iter().map(|connection| async move {
            let outcome = tokio::time::timeout(self.send_timeout, connection.send_json(message)).await;
            (connection.id(), outcome)
        });

        let mut report = FanoutReport::default();
        for (id, outcome) in join_all(sends).await {
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    tracing::warn!("[Registry] {}: send to {} failed: {}", self.topic, id, e);
                    report.failed += 1;
                }
                Err(_) => {
                    tracing::warn!(
                        "[Registry] {}: send to {} timed out after {:?}",
                        self.topic,
                        id,
                        self.send_timeout
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Receive from `broadcaster` and fan out until shutdown
    pub async fn fanout_loop(self: Arc<Self>, broadcaster: Arc<Broadcaster>, mut shutdown: Shutdown) {
        tracing::info!("[Registry] {}: fan-out loop started", self.topic);
        loop {
            let message = tokio::select! {
                _ = shutdown.wait() => break,
                message = broadcaster.receive() => match message {
                    Some(message) => message,
                    None => {
                        tracing::warn!("[Registry] {}: broadcaster closed", self.topic);
                        break;
                    }
                },
            };

            let report = self.broadcast(&message).await;
            tracing::debug!(
                "[Registry] {}: delivered to {}, failed {}",
                self.topic,
                report.delivered,
                report.failed
            );
        }
        tracing::info!("[Registry] {}: fan-out loop stopped", self.topic);
    }
}
