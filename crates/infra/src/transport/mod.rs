//! Message transport bindings for synchronization requests.
//!
//! The in-memory transport lives in `shelfsync-events`; this module holds the
//! Redis Streams binding (feature `redis`) and its settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[cfg(feature = "redis")]
mod redis_streams;

#[cfg(feature = "redis")]
pub use redis_streams::{RedisStreamsError, RedisStreamsTransport};

pub const DEFAULT_STREAM_KEY: &str = "shelfsync:book-sync";
pub const DEFAULT_DLQ_KEY: &str = "shelfsync:book-sync:dlq";
pub const DEFAULT_CONSUMER_GROUP: &str = "book-sync";

/// Stream layout and redelivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamsConfig {
    pub stream_key: String,
    /// Dead-letter stream.
    pub dlq_key: String,
    /// Consumer group shared by all synchronization workers.
    pub group: String,
    /// Deliveries after which a failing message is dead-lettered.
    pub max_deliveries: u32,
    /// How long a delivery may stay unacknowledged before another consumer may
    /// claim it.
    pub visibility_timeout: Duration,
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            stream_key: DEFAULT_STREAM_KEY.to_string(),
            dlq_key: DEFAULT_DLQ_KEY.to_string(),
            group: DEFAULT_CONSUMER_GROUP.to_string(),
            max_deliveries: 5,
            visibility_timeout: Duration::from_secs(60),
        }
    }
}
