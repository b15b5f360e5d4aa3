/**
 * Server Initialization
 *
 * This module builds the application: durable log, per-topic hubs and
 * their background loops, and the router.
 *
 * # Initialization Process
 *
 * 1. Connect the durable log (durable strategy only)
 * 2. Create one hub per configured topic; each hub starts its pumps and
 *    its fan-out loop through the shared `TaskTracker`
 * 3. Create the router
 *
 * The returned [`App`] keeps the state so the caller can run the shutdown
 * sequence after the HTTP server stopped.
 */

use std::sync::Arc;

use axum::Router;
use chrono::Utc;

use crate::backend::error::BackendResult;
use crate::backend::realtime::TopicHubs;
use crate::backend::routes::router::create_router;
use crate::backend::server::config::load_log;
use crate::backend::server::state::AppState;
use crate::backend::shutdown::{ShutdownReport, TaskTracker};
use crate::backend::stream::DurableLog;
use crate::shared::config::AppConfig;

pub struct App {
    pub router: Router<()>,
    pub state: AppState,
}

impl App {
    /// Stop every background loop, draining queued messages within the
    /// configured drain timeout
    pub async fn shutdown(&self) -> ShutdownReport {
        self.state
            .tracker
            .shutdown(self.state.config.drain_timeout())
            .await
    }
}

/// Create the application for `config`, connecting the durable log if needed
pub async fn create_app(config: AppConfig) -> BackendResult<App> {
    let log = load_log(&config).await?;
    create_app_with_log(config, log).await
}

/// Create the application with an already constructed log
pub async fn create_app_with_log(config: AppConfig, log: Option<Arc<dyn DurableLog>>) -> BackendResult<App> {
    tracing::info!(
        "[Server] Initializing ({} strategy, topics: {})",
        config.broadcaster,
        config.topics.join(", ")
    );

    let tracker = Arc::new(TaskTracker::new());
    let hubs = TopicHubs::from_config(&config, log.clone(), &tracker).await?;
    tracing::info!("[Server] {} topic hubs running", hubs.len());

    let state = AppState {
        config: Arc::new(config),
        hubs: Arc::new(hubs),
        log,
        tracker,
        started_at: Utc::now(),
    };
    let router = create_router(state.clone());

    Ok(App { router, state })
}
