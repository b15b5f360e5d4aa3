/**
 * Streamcast Server Entry Point
 *
 * Loads configuration from the environment (and `.env`), starts one hub per
 * topic and serves `GET /ws/{topic}` and `GET /health` until Ctrl-C.
 *
 * On shutdown the HTTP server stops accepting, then the background loops
 * get `DRAIN_TIMEOUT_SECS` to flush queued messages before being aborted.
 */

use std::net::SocketAddr;

use streamcast::backend::server::create_app;
use streamcast::shared::config::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Loads .env first so RUST_LOG can come from it
    let config = AppConfig::from_env();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = config.map_err(|e| {
        tracing::error!("[Runtime] Invalid configuration: {}", e);
        e
    })?;
    tracing::info!("[Runtime] Server initialization started");

    let port = config.port;
    let app = create_app(config).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("[Runtime] Listening on {}", addr);

    axum::serve(
        listener,
        app.router
            .clone()
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("[Runtime] HTTP server stopped, draining background tasks");
    let report = app.shutdown().await;
    if report.aborted > 0 {
        tracing::warn!("[Runtime] {} tasks were aborted before draining", report.aborted);
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("[Runtime] Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("[Runtime] Shutdown signal received");
}
