/**
 * Application State Management
 *
 * This module defines the application state structure and implements
 * the necessary `FromRef` traits for Axum state extraction.
 *
 * # Architecture
 *
 * The `AppState` struct is the central state container. It holds:
 * - The validated configuration
 * - One `TopicHub` per configured topic (broadcaster + connection registry)
 * - The durable log, when the durable strategy is in use
 * - The task tracker that owns every background loop
 *
 * Everything is behind `Arc`, so cloning the state per request is cheap and
 * every handler sees the same hubs.
 */

use std::sync::Arc;

use axum::extract::FromRef;
use chrono::{DateTime, Utc};

use crate::backend::realtime::TopicHubs;
use crate::backend::shutdown::TaskTracker;
use crate::backend::stream::DurableLog;
use crate::shared::config::AppConfig;

#[derive(Clone)]
pub struct AppState {
    /// Validated configuration
    pub config: Arc<AppConfig>,

    /// Per-topic hubs, looked up by the websocket handler
    pub hubs: Arc<TopicHubs>,

    /// Durable log, reported by `/health`
    ///
    /// This is `None` with the loopback strategy.
    pub log: Option<Arc<dyn DurableLog>>,

    /// Owner of every background loop and of the shutdown signal
    pub tracker: Arc<TaskTracker>,

    pub started_at: DateTime<Utc>,
}

/// Lets the websocket handler extract `State<Arc<TopicHubs>>` directly
impl FromRef<AppState> for Arc<TopicHubs> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.hubs.clone()
    }
}
