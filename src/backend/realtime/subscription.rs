/**
 * Topic WebSocket Handler
 *
 * This module implements the `GET /ws/{topic}` endpoint. Every client that
 * connects joins the topic's connection registry and receives every message
 * the topic's broadcaster yields.
 *
 * # Protocol
 *
 * - Each text frame is parsed as JSON; text that is not JSON is treated as
 *   a JSON string
 * - The client gets an acknowledgment: `{"received": <data>, "message": "ok"}`
 * - The data is then published to the topic, so every connected client
 *   (including the sender) receives it through the fan-out loop
 *
 * # Connection Management
 *
 * - Unknown topics are rejected with 404 before the upgrade
 * - The connection is removed from the registry when the socket closes or
 *   a read fails; fan-out send failures alone never remove it
 */

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{
        connect_info::ConnectInfo,
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRequestParts, Path, Request, State,
    },
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use serde_json::{json, Value};

use crate::backend::realtime::connection::{LiveConnection, WsConnection};
use crate::backend::realtime::hub::{TopicHub, TopicHubs};

/// Handle a websocket connection for a topic (GET /ws/{topic})
///
/// # Errors
///
/// * `404 Not Found` - no hub is configured for the topic
/// * `426 Upgrade Required` / `400 Bad Request` - not a websocket handshake
pub async fn handle_topic_socket(
    State(hubs): State<Arc<TopicHubs>>,
    Path(topic): Path<String>,
    request: Request,
) -> Response {
    let hub = match hubs.get(&topic) {
        Ok(hub) => hub,
        Err(e) => return e.into_response(),
    };

    let (mut parts, _body) = request.into_parts();
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0)
        .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));

    let ws = match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws,
        Err(rejection) => {
            tracing::debug!("[Socket] Rejected handshake from {} on {}: {}", peer, topic, rejection);
            return rejection.into_response();
        }
    };

    ws.on_upgrade(move |socket| serve_socket(socket, peer, hub))
}

/// Interpret one text frame
pub fn parse_frame(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

async fn serve_socket(socket: WebSocket, peer: SocketAddr, hub: Arc<TopicHub>) {
    let (sink, mut stream) = socket.split();
    let connection = Arc::new(WsConnection::new(peer, sink));
    let id = connection.id();

    hub.registry().accept(connection.clone()).await;
    tracing::info!(
        "[Socket] {} ({}) connected to {}, current clients: {}",
        id,
        peer,
        hub.topic(),
        hub.registry().len().await
    );

    while let Some(frame) = stream.next().await {
        let data = match frame {
            Ok(Message::Text(text)) => parse_frame(text.as_str()),
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => parse_frame(text),
                Err(_) => {
                    tracing::debug!("[Socket] {}: ignoring non-UTF-8 binary frame", id);
                    continue;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("[Socket] {}: read failed: {}", id, e);
                break;
            }
        };

        let ack = json!({ "received": data, "message": "ok" });
        if let Err(e) = connection.send_json(&ack).await {
            tracing::warn!("[Socket] {}: acknowledgment failed: {}", id, e);
            break;
        }
        if let Err(e) = hub.broadcaster().send(data).await {
            tracing::warn!("[Socket] {}: publish to {} failed: {}", id, hub.topic(), e);
        }
    }

    hub.registry().remove(id).await;
    tracing::info!(
        "[Socket] {} ({}) disconnected from {}, current clients: {}",
        id,
        connection.peer(),
        hub.topic(),
        hub.registry().len().await
    );
}
