//! WebSocket connection tracking and cooperative shutdown.
//!
//! [`WsConnectionManager`] tracks every live `/events` connection and gives
//! each one a [`CancellationToken`] that is a child of a single global token,
//! so a server-wide `close_all` cancels every connection in one step while
//! each connection can still be cancelled individually on disconnect.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

struct ConnectionState {
    cancel_token: CancellationToken,
}

/// Tracks active WebSocket connections and supports cancelling all of them.
pub struct WsConnectionManager {
    connections: DashMap<String, ConnectionState>,
    next_id: AtomicU64,
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(0),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a new connection and returns a guard that unregisters it on drop.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let id = format!("conn-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        let cancel_token = self.global_cancel.read().child_token();
        self.connections.insert(
            id.clone(),
            ConnectionState {
                cancel_token: cancel_token.clone(),
            },
        );
        ConnectionGuard {
            id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: &str) {
        self.connections.remove(id);
    }

    /// Returns the number of currently tracked connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Cancels every tracked connection and replaces the global token so
    /// future registrations are unaffected. Returns the number cancelled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        *self.global_cancel.write() = CancellationToken::new();
        for entry in self.connections.iter() {
            entry.value().cancel_token.cancel();
        }
        self.connections.clear();
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard for a registered connection; unregisters on drop.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    /// Returns this connection's id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns this connection's cancellation token.
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_increments_and_drop_decrements() {
        let manager = Arc::new(WsConnectionManager::new());
        let guard = manager.register();
        assert_eq!(manager.connection_count(), 1);
        drop(guard);
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn close_all_cancels_every_token_and_clears() {
        let manager = Arc::new(WsConnectionManager::new());
        let guard_a = manager.register();
        let guard_b = manager.register();
        let closed = manager.close_all();
        assert_eq!(closed, 2);
        assert!(guard_a.cancel_token().is_cancelled());
        assert!(guard_b.cancel_token().is_cancelled());
        assert_eq!(manager.connection_count(), 0);
    }

    #[test]
    fn registrations_after_close_all_are_unaffected() {
        let manager = Arc::new(WsConnectionManager::new());
        manager.close_all();
        let guard = manager.register();
        assert!(!guard.cancel_token().is_cancelled());
    }
}
