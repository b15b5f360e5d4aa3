/**
 * Router Configuration
 *
 * This module provides the main router creation function that combines
 * all route configurations into a single Axum router.
 *
 * # Route Order
 *
 * 1. Websocket topic endpoint
 * 2. API routes (health)
 * 3. Fallback handler (404)
 *
 * Every request is wrapped in a `TraceLayer` span.
 */

use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;

use crate::backend::routes::api_routes::configure_api_routes;
use crate::backend::server::state::AppState;

/// Create the Axum router with all routes configured
///
/// # Route Details
///
/// - `GET /ws/{topic}` - websocket for a configured topic, 404 otherwise
/// - `GET /health` - instance health report
///
/// Unknown paths get a JSON 404 body shaped like every other error.
pub fn create_router(app_state: AppState) -> Router<()> {
    let router = Router::new().route(
        "/ws/{topic}",
        axum::routing::get({
            use crate::backend::realtime::subscription::handle_topic_socket;
            handle_topic_socket
        }),
    );

    // Add API routes
    let router = configure_api_routes(router);

    // Fallback handler for 404
    let router = router.fallback(handle_not_found);

    router
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn handle_not_found(uri: Uri) -> Response {
    let body = serde_json::json!({
        "error": format!("No route for {}", uri.path()),
        "status": StatusCode::NOT_FOUND.as_u16(),
    });
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}
