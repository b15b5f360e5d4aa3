/**
 * Backend Error Types
 *
 * This module defines the error taxonomy of the broadcast subsystem.
 * Errors are returned from the log, the broadcaster and the HTTP layer and
 * can be converted to HTTP responses.
 *
 * # Error Categories
 *
 * ## Transport Errors
 *
 * Transient connectivity loss to the log or to a client. Background pumps
 * catch these at their loop boundary, log them and retry on the next
 * iteration.
 *
 * ## Decode Errors
 *
 * A payload could not be parsed. The entry is skipped without being
 * acknowledged so it stays pending.
 *
 * ## Delivery Errors
 *
 * A handler failed while processing a delivered entry. The entry stays
 * pending and is redelivered by the reclaim loop.
 *
 * ## Group Already Exists
 *
 * Reported by the log when a consumer group is created twice. Group
 * creation suppresses it.
 *
 * ## No Such Group
 *
 * A group read against a group that was never created. Readers recover by
 * creating the group and retrying.
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::shared::config::ConfigError;
use crate::shared::entry::EntryId;
use crate::shared::SharedError;

/// Backend-specific error types
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connectivity loss to the log or to a client
    #[error("Transport error: {message}")]
    TransportError {
        /// Human-readable error message
        message: String,
    },

    /// Payload could not be decoded
    #[error("Decode error for entry {entry_id}: {message}")]
    DecodeError {
        /// Entry whose payload failed to decode
        entry_id: EntryId,
        /// Human-readable error message
        message: String,
    },

    /// Consumer group already exists on the topic
    #[error("Consumer group '{group}' already exists on topic '{topic}'")]
    GroupAlreadyExists { group: String, topic: String },

    /// Consumer group does not exist on the topic
    #[error("Consumer group '{group}' does not exist on topic '{topic}'")]
    NoSuchGroup { group: String, topic: String },

    /// Handler failed while processing a delivered entry
    #[error("Delivery error: {message}")]
    DeliveryError {
        /// Human-readable error message
        message: String,
    },

    /// A bounded broadcaster queue is full
    #[error("Queue for topic '{topic}' is full")]
    QueueFull { topic: String },

    /// A broadcaster queue was closed (its pump is gone)
    #[error("Queue for topic '{topic}' is closed")]
    QueueClosed { topic: String },

    /// No hub is registered for the topic
    #[error("Unknown topic '{topic}'")]
    UnknownTopic { topic: String },

    /// Configuration could not be loaded
    #[error(transparent)]
    ConfigError(#[from] ConfigError),

    /// Shared error (from shared module)
    #[error(transparent)]
    SharedError(#[from] SharedError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl BackendError {
    /// Create a new transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::TransportError {
            message: message.into(),
        }
    }

    /// Create a new decode error for an entry
    pub fn decode(entry_id: EntryId, message: impl Into<String>) -> Self {
        Self::DecodeError {
            entry_id,
            message: message.into(),
        }
    }

    /// Create a new delivery error
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::DeliveryError {
            message: message.into(),
        }
    }

    pub fn unknown_topic(topic: impl Into<String>) -> Self {
        Self::UnknownTopic {
            topic: topic.into(),
        }
    }

    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::TransportError { .. } | Self::QueueFull { .. }
        )
    }

    /// Get the HTTP status code for this error
    ///
    /// # Status Code Mapping
    ///
    /// - `TransportError`, `QueueFull`, `QueueClosed` - 503 Service Unavailable
    /// - `DecodeError` - 400 Bad Request
    /// - `GroupAlreadyExists` - 409 Conflict
    /// - `UnknownTopic` - 404 Not Found
    /// - everything else - 500 Internal Server Error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::TransportError { .. } | Self::QueueFull { .. } | Self::QueueClosed { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::DecodeError { .. } => StatusCode::BAD_REQUEST,
            Self::GroupAlreadyExists { .. } => StatusCode::CONFLICT,
            Self::UnknownTopic { .. } | Self::NoSuchGroup { .. } => StatusCode::NOT_FOUND,
            Self::SharedError(err) => match err {
                SharedError::SerializationError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
                SharedError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            },
            Self::DeliveryError { .. }
            | Self::ConfigError(_)
            | Self::SerializationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error message
    pub fn message(&self) -> String {
        match self {
            Self::TransportError { message } | Self::DeliveryError { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<redis::RedisError> for BackendError {
    fn from(err: redis::RedisError) -> Self {
        Self::transport(err.to_string())
    }
}
