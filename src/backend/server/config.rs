/**
 * Server Configuration
 *
 * This module turns the configured broadcaster strategy into the durable
 * log the server runs with.
 *
 * # Error Handling
 *
 * Unlike optional services, the durable log is required by the durable
 * strategy: a connection failure aborts startup instead of silently falling
 * back to loopback, which would stop cross-instance delivery.
 */

use std::sync::Arc;

use crate::backend::error::BackendResult;
use crate::backend::stream::{DurableLog, RedisStreamLog};
use crate::shared::config::{AppConfig, BroadcasterKind};

/// Connect the durable log for the configured strategy
///
/// # Returns
///
/// - `None` for the loopback strategy
/// - `Some(log)` for the durable strategy once Redis is reachable
pub async fn load_log(config: &AppConfig) -> BackendResult<Option<Arc<dyn DurableLog>>> {
    match config.broadcaster {
        BroadcasterKind::Loopback => {
            tracing::info!("[Server] Loopback strategy, no durable log");
            Ok(None)
        }
        BroadcasterKind::Durable => {
            tracing::info!("[Server] Connecting durable log...");
            let log = RedisStreamLog::from_config(config).await.map_err(|e| {
                tracing::error!("[Server] Durable log unavailable: {}", e);
                e
            })?;
            Ok(Some(Arc::new(log)))
        }
    }
}
