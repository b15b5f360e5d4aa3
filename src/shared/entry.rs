/**
 * Log Entry Types
 *
 * This module defines the types that flow through the durable log:
 * entry identifiers, entries and pending-entry records.
 *
 * # Entry Identifiers
 *
 * Identifiers follow the `<ms>-<seq>` layout used by Redis Streams. They are
 * totally ordered per topic (milliseconds first, then sequence) and are
 * never reused, so a reader can resume from any id it has already seen.
 *
 * # Payloads
 *
 * The log never interprets payloads. They are stored as opaque bytes
 * (JSON text in practice) and decoded by whoever consumes the entry.
 */
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::shared::error::SharedError;

/// Identifier assigned to an entry at append time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId {
    /// Milliseconds timestamp
    pub ms: u64,
    /// Sequence number within the millisecond
    pub seq: u64,
}

impl EntryId {
    /// Smallest possible id, sorts before every appended entry
    pub const MIN: EntryId = EntryId { ms: 0, seq: 0 };

    /// Largest possible id
    pub const MAX: EntryId = EntryId {
        ms: u64::MAX,
        seq: u64::MAX,
    };

    pub fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }

    /// The id that must follow `self` when appended within the same clock tick
    pub fn next_after(self, now_ms: u64) -> Self {
        if now_ms > self.ms {
            Self { ms: now_ms, seq: 0 }
        } else {
            Self {
                ms: self.ms,
                seq: self.seq + 1,
            }
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = SharedError;

    /// Parse `"<ms>-<seq>"` or a bare `"<ms>"` (sequence 0)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SharedError::validation("entry_id", format!("invalid entry id '{}'", s));
        match s.split_once('-') {
            Some((ms, seq)) => Ok(Self {
                ms: ms.parse().map_err(|_| invalid())?,
                seq: seq.parse().map_err(|_| invalid())?,
            }),
            None => Ok(Self {
                ms: s.parse().map_err(|_| invalid())?,
                seq: 0,
            }),
        }
    }
}

/// A single entry stored in a topic's log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Id assigned by the log
    pub id: EntryId,
    /// Opaque payload bytes
    pub payload: Bytes,
}

impl Entry {
    pub fn new(id: EntryId, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            payload: payload.into(),
        }
    }

    /// Decode the payload as JSON into `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, SharedError> {
        serde_json::from_slice(&self.payload).map_err(|e| {
            SharedError::serialization(format!("entry {} is not valid JSON: {}", self.id, e))
        })
    }
}

/// Encode a value as the JSON payload stored in the log
pub fn encode_payload<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, SharedError> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// A delivered-but-unacknowledged entry in a consumer group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEntry {
    /// The pending entry id
    pub id: EntryId,
    /// Consumer currently owning the entry
    pub consumer: String,
    /// Milliseconds since the entry was last delivered
    pub idle_ms: u64,
    /// Number of times the entry has been delivered
    pub delivery_count: u64,
}
