//! File-backed Session Store
//!
//! All sessions live in one JSON document. Every operation takes an
//! exclusive OS lock on `<path>.lock`, reads the whole document and applies
//! its change. A changed document is written to `<path>.tmp`, synced and
//! renamed over the store, so readers only ever see a complete document.
//! Durable across restarts; safe for several processes sharing one file,
//! at the cost of serialising every operation.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::traits::{SessionRecord, SessionStorageError, SessionStore, now_millis};

#[derive(Debug, Clone)]
pub struct FileSessionConfig {
    pub path: PathBuf,
    pub session_ttl: Duration,
}

impl Default for FileSessionConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("mcp_sessions.json"),
            session_ttl: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionDocument {
    sessions: HashMap<String, SessionRecord>,
}

#[derive(Debug, Clone)]
pub struct FileSessionStore {
    config: FileSessionConfig,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(FileSessionConfig {
            path: path.into(),
            ..Default::default()
        })
    }

    pub fn with_config(config: FileSessionConfig) -> Self {
        info!("Using file session store at {:?}", config.path);
        Self { config }
    }

    /// Run `apply` against the locked document on the blocking pool.
    /// `apply` returns its result and whether the document changed.
    async fn with_document<R, F>(&self, apply: F) -> Result<R, SessionStorageError>
    where
        R: Send + 'static,
        F: FnOnce(&mut SessionDocument, u64, Duration) -> (R, bool) + Send + 'static,
    {
        let path = self.config.path.clone();
        let ttl = self.config.session_ttl;
        tokio::task::spawn_blocking(move || -> Result<R, SessionStorageError> {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let lock = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(sibling(&path, "lock"))?;
            lock.lock()?;

            let mut document = read_document(&path)?;
            let (result, dirty) = apply(&mut document, now_millis(), ttl);
            if dirty {
                write_document(&path, &document)?;
            }
            lock.unlock()?;
            Ok(result)
        })
        .await?
    }
}

/// `<path>.<extension>`, next to the store.
fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

fn read_document(path: &Path) -> Result<SessionDocument, SessionStorageError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(SessionDocument::default()),
        Err(e) => return Err(e.into()),
    };
    if text.trim().is_empty() {
        return Ok(SessionDocument::default());
    }
    Ok(serde_json::from_str(&text)?)
}

/// Caller holds the lock.
fn write_document(path: &Path, document: &SessionDocument) -> Result<(), SessionStorageError> {
    let bytes = serde_json::to_vec(document)?;
    let staging = sibling(path, "tmp");
    let mut file = File::create(&staging)?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    drop(file);
    std::fs::rename(&staging, path)?;
    Ok(())
}

#[async_trait]
impl SessionStore for FileSessionStore {
    fn backend_name(&self) -> &'static str {
        "File"
    }

    async fn create(&self) -> Result<String, SessionStorageError> {
        let id = self
            .with_document(|doc, _, _| {
                let record = SessionRecord::new();
                let id = record.id.clone();
                doc.sessions.insert(id.clone(), record);
                (id, true)
            })
            .await?;
        debug!(session_id = %id, "Created session");
        Ok(id)
    }

    async fn is_valid(&self, session_id: &str) -> Result<bool, SessionStorageError> {
        let session_id = session_id.to_string();
        self.with_document(move |doc, now, ttl| {
            let valid = doc
                .sessions
                .get(&session_id)
                .is_some_and(|r| !r.is_expired(ttl, now));
            (valid, false)
        })
        .await
    }

    async fn touch(&self, session_id: &str) -> Result<bool, SessionStorageError> {
        let session_id = session_id.to_string();
        self.with_document(move |doc, now, ttl| match doc.sessions.get_mut(&session_id) {
            Some(record) if !record.is_expired(ttl, now) => {
                record.last_activity = now;
                (true, true)
            }
            _ => (false, false),
        })
        .await
    }

    async fn terminate(&self, session_id: &str) -> Result<bool, SessionStorageError> {
        let session_id = session_id.to_string();
        self.with_document(move |doc, _, _| {
            let removed = doc.sessions.remove(&session_id).is_some();
            (removed, removed)
        })
        .await
    }

    async fn list_active(&self) -> Result<Vec<String>, SessionStorageError> {
        self.with_document(|doc, now, ttl| {
            let mut active: Vec<&SessionRecord> = doc
                .sessions
                .values()
                .filter(|r| !r.is_expired(ttl, now))
                .collect();
            active.sort_by_key(|r| r.created_at);
            (active.into_iter().map(|r| r.id.clone()).collect(), false)
        })
        .await
    }

    async fn set_metadata(
        &self,
        session_id: &str,
        metadata: String,
    ) -> Result<bool, SessionStorageError> {
        let session_id = session_id.to_string();
        self.with_document(move |doc, now, ttl| match doc.sessions.get_mut(&session_id) {
            Some(record) if !record.is_expired(ttl, now) => {
                record.metadata = Some(metadata);
                (true, true)
            }
            _ => (false, false),
        })
        .await
    }

    async fn get_metadata(&self, session_id: &str) -> Result<Option<String>, SessionStorageError> {
        let session_id = session_id.to_string();
        self.with_document(move |doc, now, ttl| {
            let metadata = doc
                .sessions
                .get(&session_id)
                .filter(|r| !r.is_expired(ttl, now))
                .and_then(|r| r.metadata.clone());
            (metadata, false)
        })
        .await
    }

    async fn cleanup_expired(&self) -> Result<usize, SessionStorageError> {
        let removed = self
            .with_document(|doc, now, ttl| {
                let before = doc.sessions.len();
                doc.sessions.retain(|_, r| !r.is_expired(ttl, now));
                let removed = before - doc.sessions.len();
                (removed, removed > 0)
            })
            .await?;
        if removed > 0 {
            info!("Cleaned up {} expired sessions", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir, ttl: Duration) -> FileSessionStore {
        FileSessionStore::with_config(FileSessionConfig {
            path: dir.path().join("sessions.json"),
            session_ttl: ttl,
        })
    }

    #[tokio::test]
    async fn test_sessions_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let store = store_in(&dir, Duration::from_secs(60));
            let id = store.create().await.unwrap();
            store.set_metadata(&id, "blob".into()).await.unwrap();
            id
        };

        let reopened = store_in(&dir, Duration::from_secs(60));
        assert!(reopened.is_valid(&id).await.unwrap());
        assert_eq!(
            reopened.get_metadata(&id).await.unwrap().as_deref(),
            Some("blob")
        );
    }

    #[tokio::test]
    async fn test_terminate_then_invalid() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, Duration::from_secs(60));
        let id = store.create().await.unwrap();

        assert!(store.touch(&id).await.unwrap());
        assert!(store.terminate(&id).await.unwrap());
        assert!(!store.is_valid(&id).await.unwrap());
        assert!(!store.touch(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_creates_are_not_lost() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, Duration::from_secs(60));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.create().await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.list_active().await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_interrupted_write_leaves_store_readable() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, Duration::from_secs(60));
        let id = store.create().await.unwrap();

        // a writer that died mid-write leaves only the staging file torn
        let staging = dir.path().join("sessions.json.tmp");
        std::fs::write(&staging, br#"{"sessions": {"01"#).unwrap();

        assert!(store.is_valid(&id).await.unwrap());
        let second = store.create().await.unwrap();
        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 2);
        assert!(active.contains(&id) && active.contains(&second));
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn test_update_replaces_whole_document() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, Duration::from_secs(60));
        let path = dir.path().join("sessions.json");
        let id = store.create().await.unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        store.set_metadata(&id, "x".repeat(64)).await.unwrap();
        let after = std::fs::read_to_string(&path).unwrap();
        assert_ne!(before, after);
        serde_json::from_str::<serde_json::Value>(&after).unwrap();
        assert!(dir.path().join("sessions.json.lock").exists());
    }

    #[tokio::test]
    async fn test_cleanup_expired() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, Duration::from_millis(50));
        let id = store.create().await.unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!store.is_valid(&id).await.unwrap());
        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert_eq!(store.cleanup_expired().await.unwrap(), 0);
    }
}
