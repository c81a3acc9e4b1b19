//! Bridge implementation that maps domain events to broadcast transport.
//!
//! The [`BroadcastEventBridge`] lives at the boundary between the registry
//! and transport concerns, forwarding events onto the WebSocket broadcast
//! channel.

use tokio::sync::broadcast;

use super::emitter::EventEmitter;
use super::BroadcastEvent;

/// Bridges domain events to the WebSocket broadcast channel.
///
/// This adapter implements [`EventEmitter`] by forwarding events to a
/// `tokio::sync::broadcast` channel that the `/events` WebSocket handler
/// subscribes to.
///
/// # Thread Safety
///
/// The bridge is `Send + Sync` and can be shared across async tasks.
#[derive(Clone)]
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl BroadcastEventBridge {
    /// Creates a new bridge with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Creates a new bridge wrapping an existing broadcast sender.
    pub fn with_sender(tx: broadcast::Sender<BroadcastEvent>) -> Self {
        Self { tx }
    }

    /// Returns a new receiver for the broadcast channel.
    ///
    /// WebSocket handlers use this to subscribe to events.
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }

    /// Returns a reference to the broadcast sender.
    pub fn sender(&self) -> &broadcast::Sender<BroadcastEvent> {
        &self.tx
    }
}

impl EventEmitter for BroadcastEventBridge {
    fn emit(&self, event: BroadcastEvent) {
        if let Err(e) = self.tx.send(event) {
            log::trace!("[EventBridge] No broadcast receivers: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bridge = BroadcastEventBridge::new(16);
        let mut rx = bridge.subscribe();

        bridge.emit(BroadcastEvent::AllStopped);

        let received = rx.recv().await.unwrap();
        assert!(matches!(received, BroadcastEvent::AllStopped));
    }

    #[test]
    fn emit_with_no_subscribers_does_not_panic() {
        let bridge = BroadcastEventBridge::new(16);
        bridge.emit(BroadcastEvent::StreamStopped { cid: 4 });
    }
}
