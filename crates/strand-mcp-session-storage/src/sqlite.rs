//! SQLite Session Store
//!
//! Shared-state backing for multi-process deployments. Every operation is a
//! single statement, and the TTL is part of each predicate, so an expired
//! session is invalid even before `cleanup_expired` removes it.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::traits::{SessionRecord, SessionStorageError, SessionStore, now_millis};

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub database_path: PathBuf,
    /// Maximum number of database connections in the pool
    pub max_connections: u32,
    pub session_ttl: Duration,
    pub create_tables_if_missing: bool,
    pub create_database_if_missing: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("mcp_sessions.db"),
            max_connections: 10,
            session_ttl: Duration::from_secs(30 * 60),
            create_tables_if_missing: true,
            create_database_if_missing: true,
        }
    }
}

pub struct SqliteSessionStore {
    pool: SqlitePool,
    config: SqliteConfig,
}

impl SqliteSessionStore {
    pub async fn new() -> Result<Self, SessionStorageError> {
        Self::with_config(SqliteConfig::default()).await
    }

    pub async fn with_config(config: SqliteConfig) -> Result<Self, SessionStorageError> {
        info!("Initializing SQLite session store at {:?}", config.database_path);

        if let Some(parent) = config
            .database_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            std::fs::create_dir_all(parent)?;
        }

        let connect_options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(config.create_database_if_missing);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(connect_options)
            .await?;

        Self::with_pool(pool, config).await
    }

    /// Use an existing pool, e.g. one shared with [`crate::SqliteEventStore`].
    pub async fn with_pool(pool: SqlitePool, config: SqliteConfig) -> Result<Self, SessionStorageError> {
        let store = Self { pool, config };
        if store.config.create_tables_if_missing {
            store.migrate().await?;
        }
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), SessionStorageError> {
        debug!("Running session table migrations");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS strand_sessions (
                id TEXT PRIMARY KEY,
                created_at INTEGER NOT NULL,
                last_activity INTEGER NOT NULL,
                metadata TEXT
            )
        "#,
        )
        .execute(&self.pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_strand_sessions_last_activity ON strand_sessions (last_activity)",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Oldest `last_activity` that still counts as live.
    fn threshold(&self) -> i64 {
        now_millis().saturating_sub(self.config.session_ttl.as_millis() as u64) as i64
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    fn backend_name(&self) -> &'static str {
        "SQLite"
    }

    async fn create(&self) -> Result<String, SessionStorageError> {
        let record = SessionRecord::new();
        sqlx::query(
            "INSERT INTO strand_sessions (id, created_at, last_activity, metadata) VALUES (?, ?, ?, NULL)",
        )
        .bind(&record.id)
        .bind(record.created_at as i64)
        .bind(record.last_activity as i64)
        .execute(&self.pool)
        .await?;
        debug!(session_id = %record.id, "Created session");
        Ok(record.id)
    }

    async fn is_valid(&self, session_id: &str) -> Result<bool, SessionStorageError> {
        let row = sqlx::query("SELECT 1 FROM strand_sessions WHERE id = ? AND last_activity >= ?")
            .bind(session_id)
            .bind(self.threshold())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn touch(&self, session_id: &str) -> Result<bool, SessionStorageError> {
        let result = sqlx::query(
            "UPDATE strand_sessions SET last_activity = ? WHERE id = ? AND last_activity >= ?",
        )
        .bind(now_millis() as i64)
        .bind(session_id)
        .bind(self.threshold())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn terminate(&self, session_id: &str) -> Result<bool, SessionStorageError> {
        let result = sqlx::query("DELETE FROM strand_sessions WHERE id = ?")
            .bind(session_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active(&self) -> Result<Vec<String>, SessionStorageError> {
        let rows = sqlx::query(
            "SELECT id FROM strand_sessions WHERE last_activity >= ? ORDER BY created_at, id",
        )
        .bind(self.threshold())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<Result<_, _>>()?)
    }

    async fn set_metadata(
        &self,
        session_id: &str,
        metadata: String,
    ) -> Result<bool, SessionStorageError> {
        let result = sqlx::query(
            "UPDATE strand_sessions SET metadata = ? WHERE id = ? AND last_activity >= ?",
        )
        .bind(metadata)
        .bind(session_id)
        .bind(self.threshold())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_metadata(&self, session_id: &str) -> Result<Option<String>, SessionStorageError> {
        let row = sqlx::query(
            "SELECT metadata FROM strand_sessions WHERE id = ? AND last_activity >= ?",
        )
        .bind(session_id)
        .bind(self.threshold())
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(row.try_get::<Option<String>, _>("metadata")?),
            None => Ok(None),
        }
    }

    async fn cleanup_expired(&self) -> Result<usize, SessionStorageError> {
        let result = sqlx::query("DELETE FROM strand_sessions WHERE last_activity < ?")
            .bind(self.threshold())
            .execute(&self.pool)
            .await?;
        let removed = result.rows_affected() as usize;
        if removed > 0 {
            info!("Cleaned up {} expired sessions", removed);
        }
        Ok(removed)
    }
}
