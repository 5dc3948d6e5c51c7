//! Session Store contract
//!
//! A session store persists session existence, activity timestamps and an
//! opaque metadata blob. Expiry is based on last activity: an expired
//! session is reported invalid by every operation even before
//! [`SessionStore::cleanup_expired`] physically removes it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current wall-clock time in Unix milliseconds.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Persisted record of one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// UUID v7, temporally ordered
    pub id: String,
    /// Unix millis
    pub created_at: u64,
    /// Unix millis
    pub last_activity: u64,
    /// Opaque to the store; callers overwrite it as a whole.
    pub metadata: Option<String>,
}

impl SessionRecord {
    pub fn new() -> Self {
        let now = now_millis();
        Self {
            id: Uuid::now_v7().to_string(),
            created_at: now,
            last_activity: now,
            metadata: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = now_millis();
    }

    pub fn is_expired(&self, ttl: Duration, now: u64) -> bool {
        now.saturating_sub(self.last_activity) > ttl.as_millis() as u64
    }
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStorageError {
    #[error("Maximum sessions limit reached: {0}")]
    MaxSessionsReached(usize),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Storage task failed: {0}")]
    TaskFailed(String),

    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl From<tokio::task::JoinError> for SessionStorageError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed(err.to_string())
    }
}

/// Pluggable session persistence.
///
/// Implementations must be safe to share between tasks, and for shared
/// backings between processes: create, touch and terminate are atomic per
/// session. `set_metadata` is a full overwrite, never a merge.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Create a session and return its id.
    async fn create(&self) -> Result<String, SessionStorageError>;

    async fn is_valid(&self, session_id: &str) -> Result<bool, SessionStorageError>;

    /// Refresh last activity. False for unknown, terminated or expired ids.
    async fn touch(&self, session_id: &str) -> Result<bool, SessionStorageError>;

    /// Remove the session. True when a record was removed.
    async fn terminate(&self, session_id: &str) -> Result<bool, SessionStorageError>;

    async fn list_active(&self) -> Result<Vec<String>, SessionStorageError>;

    /// Replace the metadata blob. False when the session is not valid.
    async fn set_metadata(
        &self,
        session_id: &str,
        metadata: String,
    ) -> Result<bool, SessionStorageError>;

    async fn get_metadata(&self, session_id: &str) -> Result<Option<String>, SessionStorageError>;

    /// Physically remove expired sessions, returning how many were removed.
    async fn cleanup_expired(&self) -> Result<usize, SessionStorageError>;
}
