//! Streamcast - Main Library
//!
//! Streamcast moves JSON messages between producers and subscribers through
//! a durable, append-only log per topic, and fans them out in real time to
//! websocket clients across any number of server instances.
//!
//! # Module Structure
//!
//! - **`shared`** - entry identifiers, configuration and shared error types
//! - **`backend`** - durable log, consumer groups, broadcasters and the Axum
//!   server
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use streamcast::backend::stream::{EventPublisher, MemoryLog};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let log = Arc::new(MemoryLog::new());
//! let publisher = EventPublisher::new(log, 1000);
//! publisher.publish("orders", &serde_json::json!({"id": 1})).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Broadcaster Strategies
//!
//! - **loopback** - in-process only, for a single instance
//! - **durable** - every instance appends to and tails the same log, so a
//!   message sent on one instance reaches clients connected to all of them

/// Shared types and data structures
pub mod shared;

/// Backend server-side code
pub mod backend;
