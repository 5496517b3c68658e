//! Event hub boundary.
//!
//! The controller's publish/subscribe bus lives outside this crate; the
//! threads here only see it through the narrow traits below. [`LocalHub`]
//! is a small in-process implementation used to assemble and test the
//! core without the real bus.

use crate::event::Event;
use crate::io::base::{BaseRx, BaseTx};
use crate::io::mpmc::{MpmcChannel, MpmcReceiver, MpmcSender};
use crate::thread::EventSink;
use crate::utils::CancelToken;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Enqueue an event for fan-out. Never blocks the publisher.
pub trait Publish: Send + Sync {
    fn publish(&self, event: Event);
}

/// Deliver at most one queued event to every subscriber within `timeout`.
/// Returns whether an event was delivered.
pub trait Dispatch: Send + Sync {
    fn dispatch_next(&self, timeout: Duration) -> bool;
}

/// Register a receiver for every dispatched event.
pub trait Subscribe: Send + Sync {
    fn subscribe(&self, sink: Arc<dyn EventSink>);
}

/// In-process hub: an unbounded FIFO drained by whoever calls
/// [`Dispatch::dispatch_next`], fanning each event out to all subscribers
/// in subscription order.
pub struct LocalHub {
    queue_tx: MpmcSender<Event>,
    queue_rx: MpmcReceiver<Event>,
    subscribers: RwLock<Vec<Arc<dyn EventSink>>>,
    // Never cancelled; dispatch waits are bounded by their timeout alone.
    idle: CancelToken,
}

impl LocalHub {
    pub fn new() -> Self {
        let (queue_tx, queue_rx) = MpmcChannel::unbounded();
        Self {
            queue_tx,
            queue_rx,
            subscribers: RwLock::new(Vec::new()),
            idle: CancelToken::new_root(),
        }
    }

    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Events published but not yet dispatched.
    pub fn pending(&self) -> usize {
        self.queue_tx.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Publish for LocalHub {
    fn publish(&self, event: Event) {
        tracing::debug!("[EventHub] publish {}", event.kind());
        // The hub owns its receiver, so the queue cannot be closed.
        if let Err(err) = self.queue_tx.try_send(event) {
            tracing::error!("[EventHub] dropped {} event: {}", err.value.kind(), err);
        }
    }
}

impl Dispatch for LocalHub {
    fn dispatch_next(&self, timeout: Duration) -> bool {
        let Ok(event) = self.queue_rx.recv(&self.idle, Some(timeout)) else {
            return false;
        };

        let subscribers = self.subscribers.read().clone();
        tracing::trace!(
            "[EventHub] dispatching {} to {} subscribers",
            event.kind(),
            subscribers.len()
        );
        for sink in subscribers {
            sink.post_event(event.clone());
        }
        true
    }
}

impl Subscribe for LocalHub {
    fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.subscribers.write().push(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventKind>>);

    impl EventSink for Collect {
        fn post_event(&self, event: Event) {
            self.0.lock().push(event.kind());
        }
    }

    #[test]
    fn dispatch_fans_out_one_event_per_call() {
        let hub = LocalHub::new();
        let a = Arc::new(Collect::default());
        let b = Arc::new(Collect::default());
        hub.subscribe(a.clone());
        hub.subscribe(b.clone());

        hub.publish(Event::new(EventKind::FlowStart));
        hub.publish(Event::new(EventKind::FlowEnd));
        assert_eq!(hub.pending(), 2);

        assert!(hub.dispatch_next(Duration::from_millis(100)));
        assert_eq!(*a.0.lock(), vec![EventKind::FlowStart]);
        assert_eq!(*b.0.lock(), vec![EventKind::FlowStart]);

        assert!(hub.dispatch_next(Duration::from_millis(100)));
        assert_eq!(*a.0.lock(), vec![EventKind::FlowStart, EventKind::FlowEnd]);
    }

    #[test]
    fn dispatch_on_empty_queue_times_out() {
        let hub = LocalHub::new();
        assert!(!hub.dispatch_next(Duration::from_millis(60)));
    }
}
