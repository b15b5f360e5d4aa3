//! Backend Module
//!
//! This module contains all server-side code: the durable log, the consumer
//! group machinery, the per-topic broadcasters and the Axum server that
//! fans messages out to websocket clients.
//!
//! # Architecture
//!
//! - **`stream`** - `DurableLog` trait with in-memory and Redis Streams
//!   implementations, tailing and consumer group readers, publisher and
//!   subscriber API
//! - **`realtime`** - broadcasters, live connection registry, topic hubs and
//!   the websocket handler
//! - **`server`** - application state and initialization
//! - **`routes`** - router assembly
//! - **`shutdown`** - background task tracking and graceful shutdown
//! - **`error`** - backend error types
//!
//! # Module Structure
//!
//! ```text
//! backend/
//! ├── mod.rs          - Module exports and documentation
//! ├── main.rs         - Server binary
//! ├── shutdown.rs     - Task tracker and shutdown signal
//! ├── error/          - Error types
//! ├── stream/         - Durable log, readers, pub/sub API
//! ├── realtime/       - Fan-out to live connections
//! ├── server/         - Server initialization and state
//! └── routes/         - Route configuration
//! ```
//!
//! # Delivery Guarantees
//!
//! - Tailing subscribers see each entry appended after they started, in order
//! - Consumer groups deliver each entry to one consumer per group, and
//!   redeliver unacknowledged entries after the reclaim idle time
//! - Live connections get best-effort delivery; a failing client never
//!   blocks the others

/// Backend error types
pub mod error;

/// Background task tracking
pub mod shutdown;

/// Durable log and stream readers
pub mod stream;

/// Real-time fan-out
pub mod realtime;

/// Server setup and configuration
pub mod server;

/// Route configuration
pub mod routes;

/// Re-export commonly used types
pub use error::{BackendError, BackendResult};
pub use server::create_app;
