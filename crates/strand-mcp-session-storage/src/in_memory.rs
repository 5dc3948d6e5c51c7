//! In-Memory Session Store
//!
//! Sessions live in an `Arc<RwLock<HashMap>>`. Suitable for tests and for
//! single-process deployments where sessions need not survive a restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::traits::{SessionRecord, SessionStorageError, SessionStore, now_millis};

#[derive(Debug, Clone)]
pub struct InMemorySessionConfig {
    /// Sessions idle longer than this are expired
    pub session_ttl: Duration,
    /// Maximum live sessions held at once
    pub max_sessions: usize,
}

impl Default for InMemorySessionConfig {
    fn default() -> Self {
        Self {
            session_ttl: Duration::from_secs(30 * 60),
            max_sessions: 100_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
    config: InMemorySessionConfig,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::with_config(InMemorySessionConfig::default())
    }

    pub fn with_config(config: InMemorySessionConfig) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Record snapshot, live or not. Mainly for diagnostics.
    pub async fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.read().await.get(session_id).cloned()
    }

    fn live<'a>(&self, record: Option<&'a SessionRecord>, now: u64) -> Option<&'a SessionRecord> {
        record.filter(|r| !r.is_expired(self.config.session_ttl, now))
    }
}

impl Default for InMemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn backend_name(&self) -> &'static str {
        "InMemory"
    }

    async fn create(&self) -> Result<String, SessionStorageError> {
        let mut sessions = self.sessions.write().await;
        if sessions.len() >= self.config.max_sessions {
            let now = now_millis();
            let ttl = self.config.session_ttl;
            sessions.retain(|_, r| !r.is_expired(ttl, now));
            if sessions.len() >= self.config.max_sessions {
                return Err(SessionStorageError::MaxSessionsReached(
                    self.config.max_sessions,
                ));
            }
        }

        let record = SessionRecord::new();
        let id = record.id.clone();
        sessions.insert(id.clone(), record);
        debug!(session_id = %id, "Created session");
        Ok(id)
    }

    async fn is_valid(&self, session_id: &str) -> Result<bool, SessionStorageError> {
        let sessions = self.sessions.read().await;
        Ok(self.live(sessions.get(session_id), now_millis()).is_some())
    }

    async fn touch(&self, session_id: &str) -> Result<bool, SessionStorageError> {
        let mut sessions = self.sessions.write().await;
        let ttl = self.config.session_ttl;
        match sessions.get_mut(session_id) {
            Some(record) if !record.is_expired(ttl, now_millis()) => {
                record.touch();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn terminate(&self, session_id: &str) -> Result<bool, SessionStorageError> {
        let removed = self.sessions.write().await.remove(session_id).is_some();
        if removed {
            debug!(session_id = %session_id, "Terminated session");
        }
        Ok(removed)
    }

    async fn list_active(&self) -> Result<Vec<String>, SessionStorageError> {
        let sessions = self.sessions.read().await;
        let now = now_millis();
        let mut active: Vec<&SessionRecord> = sessions
            .values()
            .filter(|r| !r.is_expired(self.config.session_ttl, now))
            .collect();
        active.sort_by_key(|r| r.created_at);
        Ok(active.into_iter().map(|r| r.id.clone()).collect())
    }

    async fn set_metadata(
        &self,
        session_id: &str,
        metadata: String,
    ) -> Result<bool, SessionStorageError> {
        let mut sessions = self.sessions.write().await;
        let ttl = self.config.session_ttl;
        match sessions.get_mut(session_id) {
            Some(record) if !record.is_expired(ttl, now_millis()) => {
                record.metadata = Some(metadata);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get_metadata(&self, session_id: &str) -> Result<Option<String>, SessionStorageError> {
        let sessions = self.sessions.read().await;
        Ok(self
            .live(sessions.get(session_id), now_millis())
            .and_then(|r| r.metadata.clone()))
    }

    async fn cleanup_expired(&self) -> Result<usize, SessionStorageError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        let now = now_millis();
        let ttl = self.config.session_ttl;
        sessions.retain(|_, r| !r.is_expired(ttl, now));
        let removed = before - sessions.len();
        if removed > 0 {
            info!("Cleaned up {} expired sessions", removed);
        }
        Ok(removed)
    }
}
