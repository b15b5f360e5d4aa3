//! Backend Error Module
//!
//! This module defines error types specific to the broadcast subsystem.
//! They are returned by the durable log, the broadcaster and the HTTP
//! handlers, and can be converted to HTTP responses.
//!
//! # Module Structure
//!
//! ```text
//! error/
//! ├── mod.rs        - Module exports and documentation
//! ├── types.rs      - Error type definitions
//! └── conversion.rs - Error conversion implementations
//! ```
//!
//! # Propagation Policy
//!
//! - Background pumps catch errors at their loop boundary, log them and
//!   retry on the next iteration. Nothing in a pump is fatal.
//! - Decode and delivery errors leave the entry pending for reclaim.
//! - Callers of `send`/`publish` never observe downstream delivery failures.

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

// Re-export commonly used types
pub use types::BackendError;

/// Result alias used throughout the backend
pub type BackendResult<T> = Result<T, BackendError>;
