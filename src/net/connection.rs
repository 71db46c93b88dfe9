//! Per-connection identity and worker tracking.
//!
//! # Responsibilities
//! - Tag each accepted client with a `conn-N` id for its log span
//! - Count live workers so shutdown can wait for them to drain

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id of an accepted client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts spawned workers, including those parked on admission control.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    live: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker for a freshly accepted client.
    pub fn track(&self) -> ConnectionGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            live: Arc::clone(&self.live),
            id: ConnectionId::next(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.live.load(Ordering::SeqCst)
    }

    /// Resolve once no worker is live.
    pub async fn wait_for_drain(&self) {
        while self.live.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Held by a worker for its whole life; unregisters it on drop.
#[derive(Debug)]
pub struct ConnectionGuard {
    live: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Worker finished");
    }
}
