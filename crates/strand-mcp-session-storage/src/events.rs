//! Event Store contract
//!
//! An event store keeps, per stream, an ordered log of previously sent
//! messages so a client can resume a stream from the last event it saw.
//! Logs are capped (oldest evicted first) and entries expire after a TTL.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use strand_mcp_json_rpc::Message;

/// Stream-scoped, strictly increasing event id. Decimal on the wire
/// (`Last-Event-ID`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = EventStoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(EventId)
            .map_err(|_| EventStoreError::InvalidEventId(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub event_id: EventId,
    pub message: Message,
    /// Unix millis
    pub timestamp: u64,
}

impl StoredEvent {
    pub fn is_expired(&self, ttl: Duration, now: u64) -> bool {
        now.saturating_sub(self.timestamp) > ttl.as_millis() as u64
    }

    /// Server-Sent Events frame for this event.
    pub fn format_sse(&self) -> String {
        format!(
            "id: {}\nevent: message\ndata: {}\n\n",
            self.event_id,
            self.message.to_json_string()
        )
    }
}

#[derive(Debug, Clone)]
pub struct EventStoreConfig {
    /// Appending past this count evicts the oldest event of the stream
    pub max_events_per_stream: usize,
    pub event_ttl: Duration,
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            max_events_per_stream: 1000,
            event_ttl: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("Invalid event id: {0}")]
    InvalidEventId(String),

    #[error("Corrupt stored event {event_id} in stream {stream_id}: {reason}")]
    CorruptEvent {
        stream_id: String,
        event_id: u64,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Per-stream, ordered, capped, TTL-bound message log.
///
/// A single writer per stream is assumed. There is no ordering between
/// streams.
#[async_trait]
pub trait EventStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn append(&self, stream_id: &str, message: &Message) -> Result<EventId, EventStoreError>;

    /// Visit, in order, every unexpired event after `last_event_id` (from
    /// the start when `None`). Returns the number of events visited.
    async fn replay_after(
        &self,
        stream_id: &str,
        last_event_id: Option<EventId>,
        visit: &mut (dyn for<'e> FnMut(&'e StoredEvent) + Send),
    ) -> Result<usize, EventStoreError>;

    /// True when the event is stored and not expired.
    async fn has(&self, stream_id: &str, event_id: EventId) -> Result<bool, EventStoreError>;

    /// Newest unexpired event id of the stream.
    async fn latest_event_id(&self, stream_id: &str) -> Result<Option<EventId>, EventStoreError>;

    async fn count_valid(&self, stream_id: &str) -> Result<usize, EventStoreError>;

    /// Drop expired events across all streams, returning how many. A
    /// stream left without events is forgotten along with its sequence.
    async fn evict_expired(&self) -> Result<usize, EventStoreError>;

    /// Forget the stream, returning how many events it held. Appending to
    /// a cleared stream starts a new sequence.
    async fn clear_stream(&self, stream_id: &str) -> Result<usize, EventStoreError>;
}
