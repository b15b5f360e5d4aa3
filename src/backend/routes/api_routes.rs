/**
 * API Route Handlers
 *
 * This module defines the operational HTTP endpoints.
 *
 * # Routes
 *
 * - `GET /health` - strategy, log backend, uptime and live connection counts per topic
 */

use std::collections::BTreeMap;

use axum::extract::State;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::server::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthReport {
    /// `"ok"`, or `"draining"` once shutdown started
    pub status: String,
    pub broadcaster: String,
    /// Durable log backend, absent with the loopback strategy
    pub log: Option<String>,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    /// Live connections per topic
    pub connections: BTreeMap<String, usize>,
}

/// Configure API routes
///
/// # Arguments
///
/// * `router` - The router to add routes to
///
/// # Returns
///
/// Router with API routes configured
pub fn configure_api_routes(router: Router<AppState>) -> Router<AppState> {
    router.route("/health", axum::routing::get(handle_health))
}

/// Report the state of the instance
pub async fn handle_health(State(state): State<AppState>) -> Json<HealthReport> {
    let status = if state.tracker.is_shutting_down() {
        "draining"
    } else {
        "ok"
    };
    let uptime_secs = (Utc::now() - state.started_at).num_seconds().max(0);

    Json(HealthReport {
        status: status.to_string(),
        broadcaster: state.config.broadcaster.to_string(),
        log: state.log.as_ref().map(|log| log.name().to_string()),
        started_at: state.started_at,
        uptime_secs,
        connections: state.hubs.connection_counts().await,
    })
}
