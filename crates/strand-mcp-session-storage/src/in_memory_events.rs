//! In-Memory Event Store

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use strand_mcp_json_rpc::Message;

use crate::events::{EventId, EventStore, EventStoreConfig, EventStoreError, StoredEvent};
use crate::traits::now_millis;

#[derive(Debug, Default)]
struct StreamLog {
    /// Last id handed out; survives cap evictions
    last_id: u64,
    events: VecDeque<StoredEvent>,
}

#[derive(Debug, Clone)]
pub struct InMemoryEventStore {
    streams: Arc<RwLock<HashMap<String, StreamLog>>>,
    config: EventStoreConfig,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::with_config(EventStoreConfig::default())
    }

    pub fn with_config(config: EventStoreConfig) -> Self {
        Self {
            streams: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    fn live<'a>(&self, log: &'a StreamLog, now: u64) -> impl Iterator<Item = &'a StoredEvent> {
        let ttl = self.config.event_ttl;
        log.events.iter().filter(move |e| !e.is_expired(ttl, now))
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    fn backend_name(&self) -> &'static str {
        "InMemory"
    }

    async fn append(&self, stream_id: &str, message: &Message) -> Result<EventId, EventStoreError> {
        let mut streams = self.streams.write().await;
        let log = streams.entry(stream_id.to_string()).or_default();

        log.last_id += 1;
        let event_id = EventId(log.last_id);
        log.events.push_back(StoredEvent {
            event_id,
            message: message.clone(),
            timestamp: now_millis(),
        });

        while log.events.len() > self.config.max_events_per_stream {
            if let Some(evicted) = log.events.pop_front() {
                debug!(stream_id, event_id = %evicted.event_id, "Evicted oldest event");
            }
        }
        Ok(event_id)
    }

    async fn replay_after(
        &self,
        stream_id: &str,
        last_event_id: Option<EventId>,
        visit: &mut (dyn for<'e> FnMut(&'e StoredEvent) + Send),
    ) -> Result<usize, EventStoreError> {
        let pending: Vec<StoredEvent> = {
            let streams = self.streams.read().await;
            match streams.get(stream_id) {
                Some(log) => self
                    .live(log, now_millis())
                    .filter(|e| last_event_id.is_none_or(|last| e.event_id > last))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        };
        for event in &pending {
            visit(event);
        }
        Ok(pending.len())
    }

    async fn has(&self, stream_id: &str, event_id: EventId) -> Result<bool, EventStoreError> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stream_id)
            .is_some_and(|log| self.live(log, now_millis()).any(|e| e.event_id == event_id)))
    }

    async fn latest_event_id(&self, stream_id: &str) -> Result<Option<EventId>, EventStoreError> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stream_id)
            .and_then(|log| self.live(log, now_millis()).last().map(|e| e.event_id)))
    }

    async fn count_valid(&self, stream_id: &str) -> Result<usize, EventStoreError> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stream_id)
            .map_or(0, |log| self.live(log, now_millis()).count()))
    }

    async fn evict_expired(&self) -> Result<usize, EventStoreError> {
        let mut streams = self.streams.write().await;
        let now = now_millis();
        let ttl = self.config.event_ttl;
        let mut removed = 0;
        streams.retain(|_, log| {
            let before = log.events.len();
            log.events.retain(|e| !e.is_expired(ttl, now));
            removed += before - log.events.len();
            !log.events.is_empty()
        });
        if removed > 0 {
            info!("Evicted {} expired events", removed);
        }
        Ok(removed)
    }

    async fn clear_stream(&self, stream_id: &str) -> Result<usize, EventStoreError> {
        let mut streams = self.streams.write().await;
        Ok(streams.remove(stream_id).map_or(0, |log| log.events.len()))
    }
}
