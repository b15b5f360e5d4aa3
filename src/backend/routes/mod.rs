//! Route Configuration Module
//!
//! This module configures all HTTP routes for the backend server.
//!
//! # Module Structure
//!
//! ```text
//! routes/
//! ├── mod.rs          - Module exports and documentation
//! ├── router.rs       - Main router creation
//! └── api_routes.rs   - Health endpoint
//! ```
//!
//! # Routes
//!
//! - `GET /ws/{topic}` - websocket fan-out for a configured topic
//! - `GET /health` - instance health report

/// Main router creation
pub mod router;

/// API endpoint handlers
pub mod api_routes;

pub use api_routes::HealthReport;
pub use router::create_router;
