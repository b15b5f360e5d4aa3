//! Shared Module
//!
//! Types used across the backend: log entry identifiers and payloads,
//! application configuration and the shared error type.

/// Log entries and their identifiers
pub mod entry;

/// Shared error types
pub mod error;

/// Application configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{AppConfig, AppConfigBuilder, BroadcasterKind, ConfigError};
pub use entry::{encode_payload, Entry, EntryId, PendingEntry};
pub use error::SharedError;
