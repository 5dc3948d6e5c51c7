//! SQLite Event Store
//!
//! Per-stream id sequences live in `strand_event_streams`; events in
//! `strand_events`. Append runs in one transaction: bump the sequence,
//! insert, then trim the stream to the cap.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use strand_mcp_json_rpc::Message;

use crate::events::{EventId, EventStore, EventStoreConfig, EventStoreError, StoredEvent};
use crate::traits::now_millis;

pub struct SqliteEventStore {
    pool: SqlitePool,
    config: EventStoreConfig,
}

impl SqliteEventStore {
    pub async fn new(pool: SqlitePool, config: EventStoreConfig) -> Result<Self, EventStoreError> {
        let store = Self { pool, config };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), EventStoreError> {
        debug!("Running event table migrations");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strand_event_streams (
                stream_id TEXT PRIMARY KEY,
                last_event_id INTEGER NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strand_events (
                stream_id TEXT NOT NULL,
                event_id INTEGER NOT NULL,
                message TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                PRIMARY KEY (stream_id, event_id)
            )
        "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_strand_events_timestamp ON strand_events (timestamp)")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn threshold(&self) -> i64 {
        now_millis().saturating_sub(self.config.event_ttl.as_millis() as u64) as i64
    }

    fn decode(stream_id: &str, row: &SqliteRow) -> Result<StoredEvent, EventStoreError> {
        let event_id: i64 = row.try_get("event_id")?;
        let text: String = row.try_get("message")?;
        let timestamp: i64 = row.try_get("timestamp")?;
        let message = Message::parse(&text).map_err(|e| EventStoreError::CorruptEvent {
            stream_id: stream_id.to_string(),
            event_id: event_id as u64,
            reason: e.to_string(),
        })?;
        Ok(StoredEvent {
            event_id: EventId(event_id as u64),
            message,
            timestamp: timestamp as u64,
        })
    }

    fn bind_id(event_id: EventId) -> Result<i64, EventStoreError> {
        i64::try_from(event_id.0).map_err(|_| EventStoreError::InvalidEventId(event_id.to_string()))
    }

    pub fn event_ttl(&self) -> Duration {
        self.config.event_ttl
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    fn backend_name(&self) -> &'static str {
        "SQLite"
    }

    async fn append(&self, stream_id: &str, message: &Message) -> Result<EventId, EventStoreError> {
        let text = serde_json::to_string(message)?;
        let mut tx = self.pool.begin().await?;

        let next: i64 = sqlx::query(
            r#"
            INSERT INTO strand_event_streams (stream_id, last_event_id) VALUES (?, 1)
            ON CONFLICT (stream_id) DO UPDATE SET last_event_id = last_event_id + 1
            RETURNING last_event_id
        "#,
        )
        .bind(stream_id)
        .fetch_one(&mut *tx)
        .await?
        .try_get("last_event_id")?;

        sqlx::query(
            "INSERT INTO strand_events (stream_id, event_id, message, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(stream_id)
        .bind(next)
        .bind(text)
        .bind(now_millis() as i64)
        .execute(&mut *tx)
        .await?;

        let trimmed = sqlx::query(
            r#"
            DELETE FROM strand_events WHERE stream_id = ? AND event_id <= (
                SELECT event_id FROM strand_events WHERE stream_id = ?
                ORDER BY event_id DESC LIMIT 1 OFFSET ?
            )
        "#,
        )
        .bind(stream_id)
        .bind(stream_id)
        .bind(self.config.max_events_per_stream as i64)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;
        if trimmed > 0 {
            debug!(stream_id, trimmed, "Evicted oldest events");
        }
        Ok(EventId(next as u64))
    }

    async fn replay_after(
        &self,
        stream_id: &str,
        last_event_id: Option<EventId>,
        visit: &mut (dyn for<'e> FnMut(&'e StoredEvent) + Send),
    ) -> Result<usize, EventStoreError> {
        let after = match last_event_id {
            Some(id) => Self::bind_id(id)?,
            None => 0,
        };
        let rows = sqlx::query(
            r#"
            SELECT event_id, message, timestamp FROM strand_events
            WHERE stream_id = ? AND event_id > ? AND timestamp >= ?
            ORDER BY event_id
        "#,
        )
        .bind(stream_id)
        .bind(after)
        .bind(self.threshold())
        .fetch_all(&self.pool)
        .await?;

        let mut visited = 0;
        for row in &rows {
            let event = Self::decode(stream_id, row)?;
            visit(&event);
            visited += 1;
        }
        Ok(visited)
    }

    async fn has(&self, stream_id: &str, event_id: EventId) -> Result<bool, EventStoreError> {
        let row = sqlx::query(
            "SELECT 1 FROM strand_events WHERE stream_id = ? AND event_id = ? AND timestamp >= ?",
        )
        .bind(stream_id)
        .bind(Self::bind_id(event_id)?)
        .bind(self.threshold())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn latest_event_id(&self, stream_id: &str) -> Result<Option<EventId>, EventStoreError> {
        let latest: Option<i64> = sqlx::query(
            "SELECT MAX(event_id) AS latest FROM strand_events WHERE stream_id = ? AND timestamp >= ?",
        )
        .bind(stream_id)
        .bind(self.threshold())
        .fetch_one(&self.pool)
        .await?
        .try_get("latest")?;
        Ok(latest.map(|id| EventId(id as u64)))
    }

    async fn count_valid(&self, stream_id: &str) -> Result<usize, EventStoreError> {
        let count: i64 = sqlx::query(
            "SELECT COUNT(*) AS count FROM strand_events WHERE stream_id = ? AND timestamp >= ?",
        )
        .bind(stream_id)
        .bind(self.threshold())
        .fetch_one(&self.pool)
        .await?
        .try_get("count")?;
        Ok(count as usize)
    }

    async fn evict_expired(&self) -> Result<usize, EventStoreError> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM strand_events WHERE timestamp < ?")
            .bind(self.threshold())
            .execute(&mut *tx)
            .await?
            .rows_affected() as usize;
        let streams = sqlx::query(
            r#"
            DELETE FROM strand_event_streams WHERE NOT EXISTS (
                SELECT 1 FROM strand_events WHERE strand_events.stream_id = strand_event_streams.stream_id
            )
        "#,
        )
        .execute(&mut *tx)
        .await?
        .rows_affected();
        tx.commit().await?;

        if removed > 0 {
            info!("Evicted {} expired events", removed);
        }
        if streams > 0 {
            debug!(streams, "Dropped drained streams");
        }
        Ok(removed)
    }

    async fn clear_stream(&self, stream_id: &str) -> Result<usize, EventStoreError> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM strand_events WHERE stream_id = ?")
            .bind(stream_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM strand_event_streams WHERE stream_id = ?")
            .bind(stream_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(removed as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::SqliteConnectOptions;
    use tempfile::TempDir;

    async fn store_in(dir: &TempDir, config: EventStoreConfig) -> SqliteEventStore {
        let options = SqliteConnectOptions::new()
            .filename(dir.path().join("events.db"))
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await.unwrap();
        SqliteEventStore::new(pool, config).await.unwrap()
    }

    async fn replay_ids(store: &SqliteEventStore, stream: &str, after: Option<EventId>) -> Vec<u64> {
        let mut seen = Vec::new();
        store
            .replay_after(stream, after, &mut |e: &StoredEvent| seen.push(e.event_id.0))
            .await
            .unwrap();
        seen
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, EventStoreConfig::default()).await;
        for n in 1..=4i64 {
            let id = store
                .append("s", &Message::success(n.into(), json!(n)))
                .await
                .unwrap();
            assert_eq!(id, EventId(n as u64));
        }
        assert_eq!(replay_ids(&store, "s", Some(EventId(1))).await, vec![2, 3, 4]);
        assert_eq!(store.latest_event_id("s").await.unwrap(), Some(EventId(4)));
        assert_eq!(store.latest_event_id("none").await.unwrap(), None);
        assert!(store.has("s", EventId(3)).await.unwrap());
    }

    #[tokio::test]
    async fn test_cap_is_fifo() {
        let dir = TempDir::new().unwrap();
        let store = store_in(
            &dir,
            EventStoreConfig {
                max_events_per_stream: 2,
                ..Default::default()
            },
        )
        .await;
        for n in 1..=3 {
            store
                .append("s", &Message::notification("notifications/progress", Some(json!({"n": n}))))
                .await
                .unwrap();
        }
        assert_eq!(store.count_valid("s").await.unwrap(), 2);
        assert_eq!(replay_ids(&store, "s", None).await, vec![2, 3]);
    }

    async fn stream_rows(store: &SqliteEventStore) -> i64 {
        sqlx::query("SELECT COUNT(*) AS count FROM strand_event_streams")
            .fetch_one(&store.pool)
            .await
            .unwrap()
            .get("count")
    }

    #[tokio::test]
    async fn test_clear_drops_stream_row() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, EventStoreConfig::default()).await;
        store.append("s", &Message::success(1.into(), json!(1))).await.unwrap();
        store.append("kept", &Message::success(2.into(), json!(2))).await.unwrap();
        assert_eq!(stream_rows(&store).await, 2);

        assert_eq!(store.clear_stream("s").await.unwrap(), 1);
        assert_eq!(stream_rows(&store).await, 1);
        assert_eq!(store.latest_event_id("s").await.unwrap(), None);
        assert_eq!(store.latest_event_id("kept").await.unwrap(), Some(EventId(1)));
    }

    #[tokio::test]
    async fn test_out_of_range_event_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, EventStoreConfig::default()).await;
        store.append("s", &Message::success(1.into(), json!(1))).await.unwrap();

        let huge = EventId(u64::MAX);
        let mut seen = 0;
        let err = store
            .replay_after("s", Some(huge), &mut |_: &StoredEvent| seen += 1)
            .await
            .unwrap_err();
        assert!(matches!(err, EventStoreError::InvalidEventId(_)));
        assert_eq!(seen, 0);
        assert!(matches!(
            store.has("s", huge).await,
            Err(EventStoreError::InvalidEventId(_))
        ));
    }

    #[tokio::test]
    async fn test_ttl() {
        let dir = TempDir::new().unwrap();
        let store = store_in(
            &dir,
            EventStoreConfig {
                event_ttl: Duration::from_millis(50),
                ..Default::default()
            },
        )
        .await;
        store.append("s", &Message::success(1.into(), json!(1))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.count_valid("s").await.unwrap(), 0);
        assert_eq!(replay_ids(&store, "s", None).await, Vec::<u64>::new());
        assert_eq!(store.evict_expired().await.unwrap(), 1);
        assert_eq!(stream_rows(&store).await, 0);
    }
}
