//! Real-time Fan-out Module
//!
//! Moves messages from producers to every live client of a topic.
//!
//! # Architecture
//!
//! - **`broadcaster`** - per-topic send/receive queues, loopback or durable
//! - **`connection`** - the `LiveConnection` trait and its websocket implementation
//! - **`registry`** - per-topic connection set and the fan-out loop
//! - **`hub`** - wires a broadcaster to a registry, one hub per topic
//! - **`subscription`** - the `GET /ws/{topic}` handler
//!
//! # Message Flow
//!
//! ```text
//! client frame -> Broadcaster::send -> (loopback | durable log) -> Broadcaster::receive
//!              -> LiveConnectionRegistry::broadcast -> every client of the topic
//! ```

pub mod broadcaster;
pub mod connection;
pub mod hub;
pub mod registry;
pub mod subscription;

pub use broadcaster::{Broadcaster, DurableOptions};
pub use connection::{ConnectionId, LiveConnection, WsConnection};
pub use hub::{TopicHub, TopicHubs};
pub use registry::{FanoutReport, LiveConnectionRegistry};
pub use subscription::handle_topic_socket;
