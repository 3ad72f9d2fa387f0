//! Connection state machine and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Classify each connection once (request/response or persistent)
//! - Count live connections for graceful shutdown and metrics

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Connection state for lifecycle tracking.
///
/// ```text
/// Accepted ─┬─▶ RequestResponse ──▶ Closed
///           └─▶ Upgrading ─┬─▶ Persistent   (owned by the realtime engine)
///                          └─▶ Closed       (handshake failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, no request seen yet.
    Accepted,
    /// Serving plain HTTP requests.
    RequestResponse,
    /// Upgrade handshake in progress.
    Upgrading,
    /// Handed to the realtime engine. Terminal for the gateway.
    Persistent,
    /// Closed by the gateway.
    Closed,
}

impl ConnectionState {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Accepted, RequestResponse)
                | (Accepted, Upgrading)
                | (Accepted, Closed)
                | (RequestResponse, Closed)
                | (Upgrading, Persistent)
                | (Upgrading, Closed)
        )
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection cannot move from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// Shared view of one connection's state, carried in request extensions.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    state: Arc<Mutex<ConnectionState>>,
}

impl ConnectionHandle {
    fn new(id: ConnectionId) -> Self {
        Self {
            id,
            state: Arc::new(Mutex::new(ConnectionState::Accepted)),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        *self.lock()
    }

    /// Move to `next`, failing on an illegal transition.
    pub fn transition(&self, next: ConnectionState) -> Result<(), InvalidTransition> {
        let mut state = self.lock();
        if !state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: *state,
                to: next,
            });
        }
        tracing::trace!(connection_id = %self.id, from = ?*state, to = ?next, "Connection state changed");
        *state = next;
        Ok(())
    }

    /// Record a plain HTTP request. Repeated requests on a keep-alive
    /// connection leave the classification unchanged.
    pub fn mark_request(&self) -> Result<(), InvalidTransition> {
        if self.state() == ConnectionState::RequestResponse {
            return Ok(());
        }
        self.transition(ConnectionState::RequestResponse)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ConnectionState> {
        // The state is a plain Copy value; a poisoned lock still holds a valid one.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    /// Current count of active connections.
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self {
            active_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let count = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_active_connections(count);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            handle: ConnectionHandle::new(ConnectionId::new()),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed or the deadline passes.
    /// Returns whether the tracker drained.
    pub async fn wait_for_drain(&self, deadline: Duration) -> bool {
        let wait = async {
            while self.active_count.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        tokio::time::timeout(deadline, wait).await.is_ok()
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    handle: ConnectionHandle,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.handle.id
    }

    /// Handle to share with the request pipeline.
    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let count = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_active_connections(count);

        // Upgrading and Persistent connections are settled by the engine task.
        if matches!(
            self.handle.state(),
            ConnectionState::Accepted | ConnectionState::RequestResponse
        ) {
            let _ = self.handle.transition(ConnectionState::Closed);
        }
        tracing::trace!(connection_id = %self.handle.id, "Connection closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn connection_tracker_counts() {
        let tracker = ConnectionTracker::new();
        assert_eq!(tracker.active_count(), 0);

        let guard1 = tracker.track();
        assert_eq!(tracker.active_count(), 1);

        let guard2 = tracker.track();
        assert_eq!(tracker.active_count(), 2);

        drop(guard1);
        assert_eq!(tracker.active_count(), 1);

        drop(guard2);
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn request_response_connections_close() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();
        let handle = guard.handle();

        handle.mark_request().unwrap();
        handle.mark_request().unwrap();
        assert_eq!(handle.state(), ConnectionState::RequestResponse);

        drop(guard);
        assert_eq!(handle.state(), ConnectionState::Closed);
    }

    #[test]
    fn persistent_is_terminal() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();
        let handle = guard.handle();

        handle.transition(ConnectionState::Upgrading).unwrap();
        handle.transition(ConnectionState::Persistent).unwrap();
        drop(guard);

        assert_eq!(handle.state(), ConnectionState::Persistent);
        for next in [
            ConnectionState::Accepted,
            ConnectionState::RequestResponse,
            ConnectionState::Upgrading,
            ConnectionState::Closed,
        ] {
            assert!(handle.transition(next).is_err());
        }
    }

    #[test]
    fn classification_happens_once() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();
        let handle = guard.handle();

        handle.mark_request().unwrap();
        assert_eq!(
            handle.transition(ConnectionState::Upgrading),
            Err(InvalidTransition {
                from: ConnectionState::RequestResponse,
                to: ConnectionState::Upgrading,
            })
        );
    }

    #[tokio::test]
    async fn drain_waits_for_guards() {
        let tracker = ConnectionTracker::new();
        let guard = tracker.track();

        assert!(!tracker.wait_for_drain(Duration::from_millis(150)).await);

        drop(guard);
        assert!(tracker.wait_for_drain(Duration::from_millis(150)).await);
    }
}
