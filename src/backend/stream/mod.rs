//! Durable log and everything that reads from it
//!
//! - `log`: the [`DurableLog`] contract
//! - `memory` / `redis`: its two implementations
//! - `tail`: cursor-tracking tailing reads
//! - `reader`: consumer group delivery and reclaim loops
//! - `pubsub`: publish / subscribe helpers for application code

pub mod log;
pub mod memory;
pub mod pubsub;
pub mod reader;
pub mod redis;
pub mod tail;

pub use log::{decode_entry, DurableLog, GroupStart, PendingRange, ReadCursor};
pub use memory::MemoryLog;
pub use pubsub::{EventPublisher, EventSubscriber};
pub use reader::{ConsumerGroupReader, EventHandler, ReaderOptions, ReaderState, ReclaimOptions};
pub use self::redis::RedisStreamLog;
pub use tail::TailReader;
