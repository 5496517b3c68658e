//! Event handler threads.
//!
//! A handler thread owns a local FIFO queue. Services register with it
//! through [`HandlerHandle::register_service`], declaring which callbacks
//! want which event kinds; the thread pops events off the queue and runs
//! every bound callback, in registration order.
//!
//! ```text
//!  post(ev) ──► [local queue] ──► step() ──► Quit? ── yes ──► request own quit
//!   (any thread)   (FIFO)            │
//!                                    └── no ──► bindings[kind] ──► cb1, cb2, ...
//! ```
//!
//! The binding map is rebuilt from scratch out of every registered
//! service on each registration and swapped in whole, so dispatch never
//! reads a half-built map.

use crate::error::{RecvError, TryRecvError};
use crate::event::{Event, EventKind};
use crate::io::base::{BaseRx, BaseTx};
use crate::io::mpmc::{MpmcChannel, MpmcReceiver, MpmcSender};
use crate::thread::{EventSink, ThreadCtx, ThreadLoop};
use crate::utils::{CancelToken, SnapshotCell};
use ahash::{AHashMap, AHashSet};
use crossbeam::channel as cbchan;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

type CallbackFn = dyn Fn(&Event) -> anyhow::Result<()> + Send + Sync;

/// Identity of a callback: the address of its shared closure.
/// Clones of a [`Callback`] have the same id.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub struct CallbackId(usize);

/// A named event callback.
#[derive(Clone)]
pub struct Callback {
    name: Arc<str>,
    f: Arc<CallbackFn>,
}

impl Callback {
    pub fn new<F>(name: impl Into<Arc<str>>, f: F) -> Self
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(f),
        }
    }

    #[inline]
    pub fn id(&self) -> CallbackId {
        CallbackId(Arc::as_ptr(&self.f) as *const () as usize)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn call(&self, event: &Event) -> anyhow::Result<()> {
        (self.f)(event)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callback")
            .field("name", &self.name)
            .field("id", &self.id())
            .finish()
    }
}

/// Capability of a service that wants events from a handler thread.
pub trait ProvidesEventBindings: Send + Sync {
    fn service_name(&self) -> &str;

    /// Callbacks per event kind, in the order they should run.
    fn event_bindings(&self) -> Vec<(EventKind, Vec<Callback>)>;
}

/// Event kind → callbacks, unioned over all registered services.
#[derive(Debug, Default)]
pub struct BindingMap {
    by_kind: AHashMap<EventKind, Vec<Callback>>,
}

impl BindingMap {
    /// Union of the services' bindings. A callback bound to the same kind
    /// more than once is kept once, at its first position.
    pub fn build<'a, I>(services: I) -> Self
    where
        I: IntoIterator<Item = &'a Arc<dyn ProvidesEventBindings>>,
    {
        let mut by_kind: AHashMap<EventKind, Vec<Callback>> = AHashMap::new();
        let mut seen: AHashSet<(EventKind, CallbackId)> = AHashSet::new();

        for svc in services {
            for (kind, callbacks) in svc.event_bindings() {
                let slot = by_kind.entry(kind).or_default();
                for cb in callbacks {
                    if seen.insert((kind, cb.id())) {
                        slot.push(cb);
                    }
                }
            }
        }

        Self { by_kind }
    }

    /// Callbacks bound to `kind`; empty when nothing is.
    pub fn callbacks(&self, kind: EventKind) -> &[Callback] {
        self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Callback ids per kind, for comparing maps.
    pub fn ids(&self, kind: EventKind) -> Vec<CallbackId> {
        self.callbacks(kind).iter().map(Callback::id).collect()
    }

    pub fn kinds(&self) -> Vec<EventKind> {
        let mut kinds: Vec<_> = self.by_kind.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.by_kind.values().all(Vec::is_empty)
    }
}

enum Envelope {
    Event(Event),
    Flush(cbchan::Sender<()>),
}

struct HandlerShared {
    name: String,
    queue_tx: MpmcSender<Envelope>,
    services: Mutex<Vec<Arc<dyn ProvidesEventBindings>>>,
    bindings: SnapshotCell<BindingMap>,
}

/// Registration and submission side of a handler thread.
/// Cheap to clone and usable from any thread.
#[derive(Clone)]
pub struct HandlerHandle {
    shared: Arc<HandlerShared>,
}

impl HandlerHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Add a service and rebuild the binding map.
    ///
    /// Returns `false` if this exact service was already registered, in
    /// which case nothing changes.
    pub fn register_service(&self, service: Arc<dyn ProvidesEventBindings>) -> bool {
        let mut services = self.shared.services.lock();
        if services
            .iter()
            .any(|s| std::ptr::addr_eq(Arc::as_ptr(s), Arc::as_ptr(&service)))
        {
            tracing::debug!(
                "[{}] service {} already registered",
                self.shared.name,
                service.service_name()
            );
            return false;
        }

        tracing::info!(
            "[{}] registering service {}",
            self.shared.name,
            service.service_name()
        );
        services.push(service);
        // Published under the lock so concurrent registrations cannot
        // swap in a map built from a shorter service list.
        self.shared.bindings.publish(BindingMap::build(services.iter()));
        true
    }

    /// Enqueue an event for the handler thread.
    pub fn post(&self, event: Event) {
        if let Err(err) = self.shared.queue_tx.try_send(Envelope::Event(event)) {
            if let Envelope::Event(ev) = err.value {
                tracing::debug!("[{}] dropped {} event: {}", self.shared.name, ev.kind(), err.reason);
            }
        }
    }

    /// Block until every event posted before this call has been handled,
    /// or `timeout` elapses. Returns `false` on timeout or if the handler
    /// is gone.
    pub fn flush(&self, timeout: Duration) -> bool {
        let (ack_tx, ack_rx) = cbchan::bounded(1);
        if self.shared.queue_tx.try_send(Envelope::Flush(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    /// Current binding map.
    pub fn bindings(&self) -> Arc<BindingMap> {
        self.shared.bindings.load()
    }

    /// Number of map rebuilds so far, starting at 1 for the empty map.
    pub fn bindings_seq(&self) -> u64 {
        self.shared.bindings.seq()
    }

    pub fn service_count(&self) -> usize {
        self.shared.services.lock().len()
    }

    /// Events and flush markers not yet taken by the thread.
    pub fn pending(&self) -> usize {
        self.shared.queue_tx.len()
    }
}

impl EventSink for HandlerHandle {
    fn post_event(&self, event: Event) {
        self.post(event);
    }
}

impl fmt::Debug for HandlerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerHandle")
            .field("name", &self.shared.name)
            .field("services", &self.service_count())
            .field("pending", &self.pending())
            .finish()
    }
}

/// What a single [`EventHandlerThread::step`] did.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StepOutcome {
    /// Nothing arrived within the wait.
    Idle,
    /// An event was handed to `n` callbacks (possibly zero).
    Dispatched(EventKind, usize),
    /// A shutdown event was taken; the thread is quitting.
    Quit,
    /// A flush marker was acknowledged.
    Flushed,
}

/// Body of a handler thread: the consuming end of the local queue.
pub struct EventHandlerThread {
    shared: Arc<HandlerShared>,
    queue_rx: MpmcReceiver<Envelope>,
    wait: Duration,
    drain_on_quit: bool,
}

impl EventHandlerThread {
    pub fn new(name: impl Into<String>, wait: Duration) -> Self {
        let (queue_tx, queue_rx) = MpmcChannel::unbounded();
        Self {
            shared: Arc::new(HandlerShared {
                name: name.into(),
                queue_tx,
                services: Mutex::new(Vec::new()),
                bindings: SnapshotCell::default(),
            }),
            queue_rx,
            wait,
            drain_on_quit: true,
        }
    }

    pub fn with_drain_on_quit(mut self, drain: bool) -> Self {
        self.drain_on_quit = drain;
        self
    }

    pub fn handle(&self) -> HandlerHandle {
        HandlerHandle {
            shared: self.shared.clone(),
        }
    }

    /// Wait up to `timeout` for one queued item and handle it.
    pub fn step(&mut self, cancel: &CancelToken, timeout: Duration) -> StepOutcome {
        match self.queue_rx.recv(cancel, Some(timeout)) {
            Ok(envelope) => self.handle_envelope(envelope, cancel),
            Err(RecvError::Timeout | RecvError::Cancelled | RecvError::Disconnected) => {
                StepOutcome::Idle
            }
        }
    }

    /// Handle everything already queued, without waiting for more.
    /// Returns how many items were taken.
    pub fn drain(&mut self, cancel: &CancelToken) -> usize {
        let mut taken = 0;
        loop {
            match self.queue_rx.try_recv() {
                Ok(envelope) => {
                    self.handle_envelope(envelope, cancel);
                    taken += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return taken,
            }
        }
    }

    fn handle_envelope(&self, envelope: Envelope, cancel: &CancelToken) -> StepOutcome {
        match envelope {
            Envelope::Event(event) => self.process(&event, cancel),
            Envelope::Flush(ack) => {
                let _ = ack.send(());
                StepOutcome::Flushed
            }
        }
    }

    fn process(&self, event: &Event, cancel: &CancelToken) -> StepOutcome {
        let name = &self.shared.name;
        tracing::debug!("[{}] processing {} event", name, event.kind());

        if event.is_quit() {
            if cancel.cancel() {
                tracing::info!("[{}] got quit event, quitting", name);
            } else {
                tracing::debug!("[{}] already quitting, ignoring repeated quit", name);
            }
            return StepOutcome::Quit;
        }

        let bindings = self.shared.bindings.load();
        let callbacks = bindings.callbacks(event.kind());
        if callbacks.is_empty() {
            tracing::trace!("[{}] no callbacks for {}", name, event.kind());
        }
        for cb in callbacks {
            self.invoke(cb, event);
        }
        StepOutcome::Dispatched(event.kind(), callbacks.len())
    }

    /// A failing callback is logged and skipped; the others still run.
    fn invoke(&self, cb: &Callback, event: &Event) {
        match panic::catch_unwind(AssertUnwindSafe(|| cb.call(event))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(
                "[{}] callback {} failed on {}: {:#}",
                self.shared.name,
                cb.name(),
                event.kind(),
                err
            ),
            Err(payload) => tracing::error!(
                "[{}] callback {} panicked on {}: {}",
                self.shared.name,
                cb.name(),
                event.kind(),
                panic_message(&*payload)
            ),
        }
    }
}

impl ThreadLoop for EventHandlerThread {
    fn run(&mut self, ctx: &ThreadCtx) -> anyhow::Result<()> {
        while !ctx.should_quit() {
            self.step(ctx.cancel(), self.wait);
        }
        if self.drain_on_quit {
            let n = self.drain(ctx.cancel());
            if n > 0 {
                tracing::debug!("[{}] drained {} queued items", ctx.name(), n);
            }
        }
        Ok(())
    }

    fn event_sink(&self) -> Option<Arc<dyn EventSink>> {
        Some(Arc::new(self.handle()))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
