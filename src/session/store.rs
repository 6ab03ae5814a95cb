//! Process-wide session store with an idle-eviction sweep.
//!
//! One entry per session key, created lazily on first touch. The store also
//! owns the authorization set; both are evicted together when a session
//! goes idle past the timeout, so neither map grows unbounded in a
//! long-running service.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info};

use super::state::SessionState;

/// Injected time source so eviction can be tested without waiting.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall-clock `Clock` used outside tests.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct SessionEntry {
    state: SessionState,
    last_seen: Instant,
}

/// Keyed session map plus the set of authorized session keys.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    authorized: RwLock<HashSet<String>>,
    idle_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(idle_timeout: Duration) -> Arc<Self> {
        Self::with_clock(idle_timeout, Arc::new(SystemClock))
    }

    pub fn with_clock(idle_timeout: Duration, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            authorized: RwLock::new(HashSet::new()),
            idle_timeout,
            clock,
        })
    }

    /// Run a closure against the session's state, creating the default
    /// state on first reference and stamping `last_seen`. The closure runs
    /// under the lock; callers must not await inside it.
    pub async fn update<R>(&self, key: &str, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let entry = sessions.entry(key.to_string()).or_insert_with(|| SessionEntry {
            state: SessionState::default(),
            last_seen: now,
        });
        entry.last_seen = now;
        f(&mut entry.state)
    }

    /// Clone the current state for a key (default if never touched).
    pub async fn snapshot(&self, key: &str) -> SessionState {
        let sessions = self.sessions.read().await;
        sessions
            .get(key)
            .map(|e| e.state.clone())
            .unwrap_or_default()
    }

    pub async fn authorize(&self, key: &str) {
        let mut authorized = self.authorized.write().await;
        if authorized.insert(key.to_string()) {
            info!(session = key, "Session authorized");
        }
    }

    pub async fn revoke(&self, key: &str) {
        let mut authorized = self.authorized.write().await;
        if authorized.remove(key) {
            info!(session = key, "Session authorization revoked");
        }
    }

    pub async fn is_authorized(&self, key: &str) -> bool {
        self.authorized.read().await.contains(key)
    }

    /// Evict sessions idle past the timeout, dropping their authorization
    /// with them. Returns the number of sessions evicted.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut sessions = self.sessions.write().await;
        let stale: Vec<String> = sessions
            .iter()
            .filter(|(_, e)| now.duration_since(e.last_seen) >= self.idle_timeout)
            .map(|(k, _)| k.clone())
            .collect();

        if stale.is_empty() {
            return 0;
        }

        let mut authorized = self.authorized.write().await;
        for key in &stale {
            sessions.remove(key);
            authorized.remove(key);
            debug!(session = key, "Idle session evicted");
        }
        stale.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Spawn the periodic idle sweep (runs every `interval`).
pub fn spawn_sweep_task(
    store: Arc<SessionStore>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(interval);
        loop {
            tick.tick().await;
            let evicted = store.sweep().await;
            if evicted > 0 {
                info!(evicted, "Session sweep");
            }
        }
    })
}

// ── Tests ───────────────────────────────────────────────────────────
