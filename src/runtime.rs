use crate::config::CoreConfig;
use crate::event::Event;
use crate::external::{AlarmSource, FlowManager, NullAlarms, NullFlows, ProtocolServer};
use crate::hub::{Dispatch, Publish, Subscribe};
use crate::thread::{SupervisedThread, ThreadLoop, ThreadRegistry};
use crate::utils::CancelToken;
use crate::workers::{
    AlarmFirer, EventHandlerThread, HandlerHandle, HubPump, IdleFlowMonitor, ProtocolHost,
    Watchdog,
};
use anyhow::{Context, Result};
use signal_hook::consts::TERM_SIGNALS;
use signal_hook::{SigId, flag, low_level};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub const WATCHDOG: &str = "watchdog";
pub const HUB_PUMP: &str = "eventhub-service";
pub const FLOW_MONITOR: &str = "flow-monitor";
pub const ALARM_FIRER: &str = "alarm-firer";
pub const PROTOCOL_HOST: &str = "net-protocol";

/// External objects the core threads are driven against.
pub struct Collaborators {
    pub flows: Arc<dyn FlowManager>,
    pub alarms: Arc<dyn AlarmSource>,
    /// Without a server no protocol host thread is created.
    pub protocol: Option<Arc<dyn ProtocolServer>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            flows: Arc::new(NullFlows),
            alarms: Arc::new(NullAlarms),
            protocol: None,
        }
    }
}

/// The assembled controller core.
///
/// Owns the thread registry and wires each core thread to the narrow
/// part of the environment it needs. Every registered thread is also
/// subscribed to the hub, so a published shutdown event reaches all of
/// them.
pub struct Core<H>
where
    H: Publish + Dispatch + Subscribe + 'static,
{
    cfg: CoreConfig,
    hub: Arc<H>,
    registry: ThreadRegistry,
    root: CancelToken,
}

impl<H> Core<H>
where
    H: Publish + Dispatch + Subscribe + 'static,
{
    /// Build the core threads. Nothing runs until [`start_all`](Self::start_all).
    pub fn new(cfg: CoreConfig, hub: Arc<H>, collab: Collaborators) -> Self {
        let mut core = Self {
            cfg,
            hub,
            registry: ThreadRegistry::new(),
            root: CancelToken::new_root(),
        };

        let publisher: Arc<dyn Publish> = core.hub.clone();
        let dispatcher: Arc<dyn Dispatch> = core.hub.clone();

        let watchdog = Watchdog::new(
            core.registry.clone(),
            publisher.clone(),
            core.cfg.watchdog_interval(),
        )
        .with_escalation(core.cfg.fault_escalation());
        core.add_thread(WATCHDOG, watchdog);

        let pump = HubPump::new(dispatcher, core.cfg.hub_dispatch_timeout());
        core.add_thread(HUB_PUMP, pump);

        let monitor = IdleFlowMonitor::new(
            collab.flows,
            publisher.clone(),
            core.cfg.flow_scan_interval(),
            core.cfg.flow_idle_threshold(),
        );
        core.add_thread(FLOW_MONITOR, monitor);

        let firer = AlarmFirer::new(collab.alarms, publisher, core.cfg.alarm_wait());
        core.add_thread(ALARM_FIRER, firer);

        if let Some(server) = collab.protocol {
            core.add_thread(PROTOCOL_HOST, ProtocolHost::new(server));
        }

        core
    }

    /// Register and subscribe an extra supervised thread.
    pub fn add_thread(&mut self, name: &str, body: impl ThreadLoop) -> SupervisedThread {
        let thread = SupervisedThread::with_cancel(name, body, self.root.new_child());
        self.hub.subscribe(Arc::new(thread.clone()));
        self.registry.add(thread.clone());
        thread
    }

    /// Create a handler thread; register services on the returned handle.
    pub fn add_handler(&mut self, name: &str) -> HandlerHandle {
        let worker = EventHandlerThread::new(name, self.cfg.handler_wait())
            .with_drain_on_quit(self.cfg.drain_on_quit());
        let handle = worker.handle();
        self.add_thread(name, worker);
        handle
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    pub fn hub(&self) -> &Arc<H> {
        &self.hub
    }

    pub fn registry(&self) -> &ThreadRegistry {
        &self.registry
    }

    pub fn thread(&self, name: &str) -> Option<SupervisedThread> {
        self.registry.get(name)
    }

    /// Start every registered thread that has not started yet, in
    /// registration order.
    pub fn start_all(&self) -> Result<()> {
        for thr in self.registry.snapshot() {
            if thr.has_started() {
                continue;
            }
            thr.start()
                .with_context(|| format!("failed to start {}", thr.name()))?;
            tracing::info!("[Core] started {}", thr.name());
        }
        Ok(())
    }

    /// `true` while at least one started thread is still running.
    pub fn any_alive(&self) -> bool {
        self.registry.snapshot().iter().any(|t| t.is_alive())
    }

    /// Block until every thread has stopped.
    ///
    /// SIGINT/SIGTERM publish the shutdown event. If threads are still
    /// running `join_timeout` after that, quit is requested on each
    /// directly.
    pub fn run_blocking(&self) -> Result<()> {
        let term = TermSignals::register()?;

        let mut quit_deadline: Option<Instant> = None;
        while self.any_alive() {
            if quit_deadline.is_none() && term.received() {
                tracing::warn!("[Core] termination signal received");
                self.hub.publish(Event::quit());
                quit_deadline = Some(Instant::now() + self.cfg.join_timeout());
            }
            if let Some(deadline) = quit_deadline
                && Instant::now() >= deadline
            {
                tracing::warn!("[Core] threads still running after quit, forcing");
                self.request_quit_all();
                quit_deadline = Some(Instant::now() + self.cfg.join_timeout());
            }
            thread::sleep(Duration::from_millis(100));
        }

        self.join_all(self.cfg.join_timeout());
        tracing::info!("[Core] all threads stopped");
        Ok(())
    }

    /// Publish the shutdown event, request quit on every thread and wait
    /// for them. Returns `true` if all stopped within `join_timeout`.
    pub fn shutdown(&self) -> bool {
        tracing::info!("[Core] shutting down");
        self.hub.publish(Event::quit());
        self.request_quit_all();
        self.join_all(self.cfg.join_timeout())
    }

    fn request_quit_all(&self) {
        for thr in self.registry.snapshot() {
            thr.request_quit();
        }
    }

    fn join_all(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut all = true;
        for thr in self.registry.snapshot() {
            let left = deadline.saturating_duration_since(Instant::now());
            if !thr.join(left) {
                tracing::error!("[Core] {} did not stop within {:?}", thr.name(), timeout);
                all = false;
            }
        }
        all
    }
}

/// SIGINT/SIGTERM latched into a flag for as long as this value lives.
struct TermSignals {
    flag: Arc<AtomicBool>,
    ids: Vec<SigId>,
}

impl TermSignals {
    fn register() -> Result<Self> {
        let mut term = Self {
            flag: Arc::new(AtomicBool::new(false)),
            ids: Vec::with_capacity(TERM_SIGNALS.len()),
        };
        for sig in TERM_SIGNALS {
            // On error `term` drops and unregisters what was already added.
            let id = flag::register(*sig, term.flag.clone())
                .with_context(|| format!("failed to register handler for signal {sig}"))?;
            term.ids.push(id);
        }
        Ok(term)
    }

    fn received(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Drop for TermSignals {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            low_level::unregister(id);
        }
    }
}

impl<H> Drop for Core<H>
where
    H: Publish + Dispatch + Subscribe + 'static,
{
    fn drop(&mut self) {
        if self.any_alive() {
            self.root.cancel();
            self.request_quit_all();
        }
    }
}
