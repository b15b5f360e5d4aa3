//! Live client connections
//!
//! The registry only needs an id and a way to push a JSON message, so it
//! works against the [`LiveConnection`] trait. [`WsConnection`] is the
//! websocket implementation; tests register in-memory doubles.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;
use serde_json::Value;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backend::error::{BackendError, BackendResult};

pub type ConnectionId = Uuid;

#[async_trait]
pub trait LiveConnection: Send + Sync + 'static {
    fn id(&self) -> ConnectionId;

    /// Push one message to the client
    async fn send_json(&self, message: &Value) -> BackendResult<()>;
}

/// Sending half of an accepted websocket
pub struct WsConnection {
    id: ConnectionId,
    peer: SocketAddr,
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsConnection {
    pub fn new(peer: SocketAddr, sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            sink: Mutex::new(sink),
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl LiveConnection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn send_json(&self, message: &Value) -> BackendResult<()> {
        let text = serde_json::to_string(message)?;
        self.sink
            .lock()
            .await
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| BackendError::transport(format!("websocket {}: {}", self.peer, e)))
    }
}
