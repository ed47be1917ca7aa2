//! Registry of live sessions
//!
//! Every accepted connection registers itself and holds a [`SessionGuard`].
//! Dropping the guard removes the entry, so a session disappears from the
//! registry on every exit path, including panics inside its task.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::trace;

/// Process-unique session id
pub type SessionId = u64;

/// Which listener accepted the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// SOCKS5 client connection
    Socks,
    /// Framed tunnel client connection
    Tunnel,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionKind::Socks => write!(f, "socks"),
            SessionKind::Tunnel => write!(f, "tunnel"),
        }
    }
}

/// A registered session
#[derive(Debug, Clone)]
pub struct SessionEntry {
    /// Session id
    pub id: SessionId,
    /// Listener kind
    pub kind: SessionKind,
    /// Remote peer address
    pub peer: SocketAddr,
    /// When the session was registered
    pub started: Instant,
}

impl SessionEntry {
    /// Time since registration
    pub fn age(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Shared table of live sessions
#[derive(Debug, Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionId, SessionEntry>>,
    drained: Notify,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionEntry>> {
        // Entries are plain data, a poisoned map is still consistent
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new session and return the guard that owns its entry
    pub fn register(self: &Arc<Self>, kind: SessionKind, peer: SocketAddr) -> SessionGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = SessionEntry {
            id,
            kind,
            peer,
            started: Instant::now(),
        };

        self.sessions().insert(id, entry);
        trace!("Registered {} session {} from {}", kind, id, peer);

        SessionGuard {
            id,
            registry: Arc::clone(self),
        }
    }

    fn remove(&self, id: SessionId) {
        let now_empty = {
            let mut sessions = self.sessions();
            sessions.remove(&id);
            sessions.is_empty()
        };
        trace!("Removed session {}", id);

        if now_empty {
            self.drained.notify_waiters();
        }
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    /// Whether no session is live
    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    /// Copy of all live entries, ordered by id
    pub fn snapshot(&self) -> Vec<SessionEntry> {
        let mut entries: Vec<_> = self.sessions().values().cloned().collect();
        entries.sort_by_key(|e| e.id);
        entries
    }

    /// Wait until every session has ended or `timeout` elapses
    ///
    /// Returns `true` if the registry drained in time.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let drained = async {
            loop {
                // Created before the check so a concurrent removal is not missed
                let notified = self.drained.notified();
                if self.is_empty() {
                    return;
                }
                notified.await;
            }
        };

        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}

/// Removes its session from the registry on drop
#[derive(Debug)]
pub struct SessionGuard {
    id: SessionId,
    registry: Arc<SessionRegistry>,
}

impl SessionGuard {
    /// Id of the guarded session
    pub fn id(&self) -> SessionId {
        self.id
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_register_and_drop() {
        let registry = Arc::new(SessionRegistry::new());
        assert!(registry.is_empty());

        let a = registry.register(SessionKind::Socks, peer(1000));
        let b = registry.register(SessionKind::Tunnel, peer(1001));
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.len(), 2);

        let b_id = b.id();
        drop(a);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.snapshot()[0].id, b_id);

        drop(b);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_ordered() {
        let registry = Arc::new(SessionRegistry::new());
        let guards: Vec<_> = (0..5)
            .map(|i| registry.register(SessionKind::Socks, peer(2000 + i)))
            .collect();

        let snapshot = registry.snapshot();
        let ids: Vec<_> = snapshot.iter().map(|e| e.id).collect();
        let expected: Vec<_> = guards.iter().map(|g| g.id()).collect();
        assert_eq!(ids, expected);
        assert_eq!(snapshot[2].peer, peer(2002));
        assert_eq!(snapshot[0].kind, SessionKind::Socks);
    }

    #[test]
    fn test_ids_are_unique_across_threads() {
        let registry = Arc::new(SessionRegistry::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    (0..100)
                        .map(|_| registry.register(SessionKind::Socks, peer(3000)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let guards: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(registry.len(), 400);

        drop(guards);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_guard_removed_when_task_panics() {
        let registry = Arc::new(SessionRegistry::new());
        let guard = registry.register(SessionKind::Tunnel, peer(4000));

        let result = std::thread::spawn(move || {
            let _guard = guard;
            panic!("session task died");
        })
        .join();

        assert!(result.is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_wait_idle_empty_returns_immediately() {
        let registry = SessionRegistry::new();
        assert!(registry.wait_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_wait_idle_wakes_on_last_removal() {
        let registry = Arc::new(SessionRegistry::new());
        let a = registry.register(SessionKind::Socks, peer(5000));
        let b = registry.register(SessionKind::Socks, peer(5001));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(a);
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(b);
        });

        assert!(registry.wait_idle(Duration::from_secs(2)).await);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_wait_idle_times_out() {
        let registry = Arc::new(SessionRegistry::new());
        let _guard = registry.register(SessionKind::Socks, peer(6000));

        assert!(!registry.wait_idle(Duration::from_millis(50)).await);
        assert_eq!(registry.len(), 1);
    }
}
