//! Supervised OS threads.
//!
//! A [`SupervisedThread`] pairs a loop body ([`ThreadLoop`]) with the
//! flags the rest of the controller observes: `started`, `alive` and the
//! quit request carried by its [`CancelToken`]. Quitting is cooperative:
//! [`request_quit`](SupervisedThread::request_quit) only cancels the token
//! (plus an optional hook) and the body returns at its next bounded wait.

use crate::error::ThreadError;
use crate::event::Event;
use crate::utils::{CancelToken, DownOnDrop, HealthFlag};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Anything that can receive events fanned out by the hub.
pub trait EventSink: Send + Sync {
    fn post_event(&self, event: Event);
}

/// Runs on the requester's thread when quit is requested.
pub type QuitHook = Box<dyn Fn() + Send + Sync>;

/// What a loop body sees while running.
#[derive(Debug, Clone)]
pub struct ThreadCtx {
    name: Arc<str>,
    cancel: CancelToken,
}

impl ThreadCtx {
    pub fn new(name: impl Into<Arc<str>>, cancel: CancelToken) -> Self {
        Self {
            name: name.into(),
            cancel,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn cancel(&self) -> &CancelToken {
        &self.cancel
    }

    #[inline]
    pub fn should_quit(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Body of a supervised thread.
///
/// `run` must return within a bounded time once `ctx` is cancelled.
/// Returning while quit was not requested, with `Ok` or `Err`, is an
/// unexpected death as far as the watchdog is concerned.
pub trait ThreadLoop: Send + 'static {
    fn run(&mut self, ctx: &ThreadCtx) -> anyhow::Result<()>;

    /// Extra action for `request_quit`, for bodies blocked in a call that
    /// does not watch the token.
    fn quit_hook(&self) -> Option<QuitHook> {
        None
    }

    /// Local queue that incoming events go to. Bodies without one quit
    /// directly on the shutdown event and ignore everything else.
    fn event_sink(&self) -> Option<Arc<dyn EventSink>> {
        None
    }
}

struct ThreadInner {
    name: String,
    started: AtomicBool,
    alive: HealthFlag,
    cancel: CancelToken,
    quit_hook: Option<QuitHook>,
    hook_fired: AtomicBool,
    sink: Option<Arc<dyn EventSink>>,
    body: Mutex<Option<Box<dyn ThreadLoop>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a supervised thread. Clones refer to the same thread.
#[derive(Clone)]
pub struct SupervisedThread {
    inner: Arc<ThreadInner>,
}

impl SupervisedThread {
    pub fn new(name: impl Into<String>, body: impl ThreadLoop) -> Self {
        Self::with_cancel(name, body, CancelToken::new_root())
    }

    /// Build around an existing token, typically a child of a process-wide one.
    pub fn with_cancel(name: impl Into<String>, body: impl ThreadLoop, cancel: CancelToken) -> Self {
        let quit_hook = body.quit_hook();
        let sink = body.event_sink();

        Self {
            inner: Arc::new(ThreadInner {
                name: name.into(),
                started: AtomicBool::new(false),
                alive: HealthFlag::new(false),
                cancel,
                quit_hook,
                hook_fired: AtomicBool::new(false),
                sink,
                body: Mutex::new(Some(Box::new(body))),
                join: Mutex::new(None),
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    #[inline]
    pub fn has_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.inner.alive.get()
    }

    #[inline]
    pub fn quit_requested(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    /// Spawn the loop on a named OS thread.
    ///
    /// The thread counts as started and alive once this returns `Ok`. A
    /// failed spawn leaves the handle as it was, so it can be retried.
    pub fn start(&self) -> Result<(), ThreadError> {
        self.start_with(|builder, main| builder.spawn(main))
    }

    fn start_with<S>(&self, spawn: S) -> Result<(), ThreadError>
    where
        S: FnOnce(thread::Builder, Box<dyn FnOnce() + Send>) -> io::Result<JoinHandle<()>>,
    {
        let name = self.inner.name.clone();
        if self
            .inner
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ThreadError::AlreadyStarted(name));
        }
        self.inner.alive.up();

        let inner = self.inner.clone();
        let main = Box::new(move || {
            let _alive = DownOnDrop(inner.alive.clone());
            // Taken here rather than before the spawn, so the body is still
            // in place if the OS refuses the thread.
            let Some(mut body) = inner.body.lock().take() else {
                return;
            };
            let ctx = ThreadCtx::new(inner.name.as_str(), inner.cancel.clone());
            tracing::debug!("[{}] thread started", ctx.name());
            match body.run(&ctx) {
                Ok(()) if ctx.should_quit() => {
                    tracing::info!("[{}] thread stopped", ctx.name())
                }
                Ok(()) => tracing::warn!("[{}] thread returned without quit", ctx.name()),
                Err(err) => tracing::error!("[{}] thread failed: {:#}", ctx.name(), err),
            }
        });

        match spawn(thread::Builder::new().name(name.clone()), main) {
            Ok(handle) => {
                *self.inner.join.lock() = Some(handle);
                Ok(())
            }
            Err(source) => {
                self.inner.alive.down();
                self.inner.started.store(false, Ordering::Release);
                Err(ThreadError::Spawn { name, source })
            }
        }
    }

    /// Ask the loop to stop at its next check point. Idempotent.
    pub fn request_quit(&self) {
        if self.inner.cancel.cancel() {
            tracing::debug!("[{}] quit requested", self.inner.name);
        }
        if let Some(hook) = &self.inner.quit_hook
            && !self.inner.hook_fired.swap(true, Ordering::AcqRel)
        {
            hook();
        }
    }

    /// Wait up to `timeout` for the loop to return.
    /// Returns `true` if the thread is no longer running.
    pub fn join(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut slot = self.inner.join.lock();
                match slot.as_ref() {
                    None => return !self.is_alive(),
                    Some(handle) if handle.is_finished() => {
                        if let Some(handle) = slot.take()
                            && handle.join().is_err()
                        {
                            tracing::error!("[{}] thread panicked", self.inner.name);
                        }
                        return true;
                    }
                    Some(_) => {}
                }
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
    }
}

impl EventSink for SupervisedThread {
    fn post_event(&self, event: Event) {
        match &self.inner.sink {
            Some(sink) => sink.post_event(event),
            None if event.is_quit() => {
                tracing::info!("[{}] got quit event, quitting", self.inner.name);
                self.request_quit();
            }
            None => tracing::trace!("[{}] ignoring {} event", self.inner.name, event.kind()),
        }
    }
}

impl fmt::Debug for SupervisedThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupervisedThread")
            .field("name", &self.inner.name)
            .field("started", &self.has_started())
            .field("alive", &self.is_alive())
            .field("quit_requested", &self.quit_requested())
            .finish()
    }
}

/// Append-only list of every supervised thread in the process.
/// Clones share the same list.
#[derive(Clone, Default, Debug)]
pub struct ThreadRegistry {
    threads: Arc<RwLock<Vec<SupervisedThread>>>,
}

impl ThreadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, thread: SupervisedThread) {
        self.threads.write().push(thread);
    }

    /// Registration-ordered copy of the current handles.
    pub fn snapshot(&self) -> Vec<SupervisedThread> {
        self.threads.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<SupervisedThread> {
        self.threads.read().iter().find(|t| t.name() == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.threads.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.read().is_empty()
    }
}
