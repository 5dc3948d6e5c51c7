//! Cooperative cancellation.
//!
//! `notifications/cancelled` marks a request as cancelled; a long-running
//! tool observes that through its [`CancellationHandle`]. Nothing is
//! aborted by the engine itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::watch;

use strand_mcp_json_rpc::RequestId;

/// Clone-friendly cancellation flag backed by a `watch` channel.
#[derive(Clone, Debug)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancellationHandle {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; immediately if already cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // a dropped sender counts as cancelled
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancellationHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests are keyed by the scope they arrived on (the HTTP session, or
/// `None` for a single-connection transport) and their request id, so equal
/// ids from different sessions never reach each other.
type CancellationKey = (Option<String>, RequestId);

/// In-flight requests that can be cancelled.
#[derive(Debug, Default)]
pub struct CancellationRegistry {
    in_flight: Mutex<HashMap<CancellationKey, Vec<(u64, CancellationHandle)>>>,
    next_token: AtomicU64,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `request_id` within `scope` until the returned guard is
    /// dropped.
    pub fn register(
        self: &Arc<Self>,
        scope: Option<&str>,
        request_id: RequestId,
    ) -> CancellationGuard {
        let key = (scope.map(str::to_string), request_id);
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let handle = CancellationHandle::new();
        self.in_flight
            .lock()
            .entry(key.clone())
            .or_default()
            .push((token, handle.clone()));
        CancellationGuard {
            registry: Arc::clone(self),
            key,
            token,
            handle,
        }
    }

    fn release(&self, key: &CancellationKey, token: u64) {
        let mut in_flight = self.in_flight.lock();
        if let Some(entries) = in_flight.get_mut(key) {
            entries.retain(|(t, _)| *t != token);
            if entries.is_empty() {
                in_flight.remove(key);
            }
        }
    }

    /// Signal cancellation to every in-flight request matching `scope` and
    /// `request_id`. False when none is running.
    pub fn cancel(&self, scope: Option<&str>, request_id: &RequestId) -> bool {
        let key = (scope.map(str::to_string), request_id.clone());
        match self.in_flight.lock().get(&key) {
            Some(entries) => {
                for (_, handle) in entries {
                    handle.cancel();
                }
                true
            }
            None => false,
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().values().map(Vec::len).sum()
    }
}

/// Registration of one in-flight request. Dropping it, whether the request
/// finished or its future was abandoned, removes the entry.
#[derive(Debug)]
pub struct CancellationGuard {
    registry: Arc<CancellationRegistry>,
    key: CancellationKey,
    token: u64,
    handle: CancellationHandle,
}

impl CancellationGuard {
    pub fn handle(&self) -> &CancellationHandle {
        &self.handle
    }
}

impl Drop for CancellationGuard {
    fn drop(&mut self) {
        self.registry.release(&self.key, self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_sets_flag_on_clones() {
        let handle = CancellationHandle::new();
        let clone = handle.clone();
        assert!(!clone.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_future_resolves() {
        let handle = CancellationHandle::new();
        let clone = handle.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            clone.cancel();
        });

        tokio::time::timeout(Duration::from_secs(1), handle.cancelled())
            .await
            .expect("cancelled() should resolve within timeout");
    }

    #[tokio::test]
    async fn test_registry_lifecycle() {
        let registry = Arc::new(CancellationRegistry::new());
        let id = RequestId::from("slow");
        let guard = registry.register(None, id.clone());
        let handle = guard.handle().clone();
        assert_eq!(registry.in_flight(), 1);

        assert!(registry.cancel(None, &id));
        assert!(handle.is_cancelled());

        drop(guard);
        assert_eq!(registry.in_flight(), 0);
        assert!(!registry.cancel(None, &id));
    }

    #[test]
    fn test_scopes_are_isolated() {
        let registry = Arc::new(CancellationRegistry::new());
        let id = RequestId::Number(5);
        let a = registry.register(Some("session-a"), id.clone());
        let b = registry.register(Some("session-b"), id.clone());

        assert!(registry.cancel(Some("session-b"), &id));
        assert!(!a.handle().is_cancelled());
        assert!(b.handle().is_cancelled());
        assert!(!registry.cancel(None, &id));
    }

    #[test]
    fn test_duplicate_ids_keep_their_own_entries() {
        let registry = Arc::new(CancellationRegistry::new());
        let id = RequestId::Number(1);
        let first = registry.register(None, id.clone());
        let second = registry.register(None, id.clone());
        assert_eq!(registry.in_flight(), 2);

        drop(first);
        assert_eq!(registry.in_flight(), 1);
        assert!(registry.cancel(None, &id));
        assert!(second.handle().is_cancelled());
    }
}
