//! Event emitter abstraction for decoupling the registry from transport.
//!
//! The registry depends on the [`EventEmitter`] trait rather than a concrete
//! broadcast channel, enabling testing and alternative transport
//! implementations without threading a broadcast sender through every
//! component.

use super::BroadcastEvent;

/// Trait for emitting domain events without knowledge of transport.
///
/// The teacher's emitter had one method per event domain (stream, network,
/// topology, ...); this spec calls for a single topic, so there is a single
/// `emit` method here instead.
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn do_something(&self) {
///         self.emitter.emit(BroadcastEvent::AllStopped);
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits an event to all current subscribers.
    fn emit(&self, event: BroadcastEvent);
}

/// No-op emitter for testing.
///
/// Events are silently discarded.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit(&self, _event: BroadcastEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level instead of delivering them anywhere.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit(&self, event: BroadcastEvent) {
        log::debug!("[EventEmitter] {:?}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Test emitter that counts events.
    struct CountingEventEmitter {
        count: AtomicUsize,
    }

    impl CountingEventEmitter {
        fn new() -> Self {
            Self {
                count: AtomicUsize::new(0),
            }
        }
    }

    impl EventEmitter for CountingEventEmitter {
        fn emit(&self, _event: BroadcastEvent) {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn counting_emitter_tracks_events() {
        let emitter = Arc::new(CountingEventEmitter::new());

        emitter.emit(BroadcastEvent::StreamStopped { cid: 0 });
        emitter.emit(BroadcastEvent::AllStopped);

        assert_eq!(emitter.count.load(Ordering::SeqCst), 2);
    }
}
