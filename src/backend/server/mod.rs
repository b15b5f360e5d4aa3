//! Server Module
//!
//! This module contains the server-side code for initializing the Axum
//! HTTP server.
//!
//! # Architecture
//!
//! - **`state`** - `AppState` and its `FromRef` implementations
//! - **`config`** - durable log connection for the configured strategy
//! - **`init`** - application creation
//!
//! # Example
//!
//! ```rust,no_run
//! use streamcast::backend::server::create_app;
//! use streamcast::shared::config::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_env()?;
//! let app = create_app(config).await?;
//! // serve app.router, then:
//! app.shutdown().await;
//! # Ok(())
//! # }
//! ```

/// Application state management
pub mod state;

/// Durable log loading
pub mod config;

/// Server initialization
pub mod init;

pub use init::{create_app, create_app_with_log, App};
pub use state::AppState;
