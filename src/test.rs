#[cfg(test)]
pub(crate) mod support {
    use crate::event::{Event, EventKind, TapIdle};
    use crate::external::{Alarm, AlarmSource, Flow, FlowManager, ProtocolServer, ProtocolService};
    use crate::hub::Publish;
    use crate::thread::{EventSink, ThreadCtx, ThreadLoop};
    use crossbeam::channel::{self, Receiver, Sender};
    use parking_lot::{Condvar, Mutex};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::{Duration, Instant, SystemTime};

    /// Poll `cond` until it holds or `dur` passes.
    pub fn wait_until(dur: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        loop {
            if cond() {
                return true;
            }
            if start.elapsed() > dur {
                return false;
            }
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Body that runs until quit, or returns early (a "death") when
    /// signalled through the paired sender.
    pub struct ExitOnSignal {
        kill: Receiver<()>,
    }

    impl ExitOnSignal {
        pub fn new() -> (Self, Sender<()>) {
            let (tx, rx) = channel::unbounded();
            (Self { kill: rx }, tx)
        }
    }

    impl ThreadLoop for ExitOnSignal {
        fn run(&mut self, ctx: &ThreadCtx) -> anyhow::Result<()> {
            while !ctx.should_quit() {
                if self.kill.recv_timeout(Duration::from_millis(20)).is_ok() {
                    return Ok(());
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct RecordingPublisher {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingPublisher {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn kinds(&self) -> Vec<EventKind> {
            self.events.lock().iter().map(Event::kind).collect()
        }

        pub fn count(&self, kind: EventKind) -> usize {
            self.events.lock().iter().filter(|e| e.kind() == kind).count()
        }

        pub fn idle_taps(&self) -> Vec<String> {
            self.events
                .lock()
                .iter()
                .filter_map(|e| e.payload::<TapIdle>())
                .map(|p| p.tap_name.clone())
                .collect()
        }
    }

    impl Publish for RecordingPublisher {
        fn publish(&self, event: Event) {
            self.events.lock().push(event);
        }
    }

    /// Hub subscriber that forwards everything to a channel.
    pub struct RecordingSink {
        tx: Sender<EventKind>,
        rx: Receiver<EventKind>,
    }

    impl RecordingSink {
        pub fn new() -> Arc<Self> {
            let (tx, rx) = channel::unbounded();
            Arc::new(Self { tx, rx })
        }

        pub fn recv_kind_within(&self, kind: EventKind, dur: Duration) -> bool {
            let deadline = Instant::now() + dur;
            while let Some(left) = deadline.checked_duration_since(Instant::now()) {
                match self.rx.recv_timeout(left) {
                    Ok(k) if k == kind => return true,
                    Ok(_) => continue,
                    Err(_) => return false,
                }
            }
            false
        }
    }

    impl EventSink for RecordingSink {
        fn post_event(&self, event: Event) {
            let _ = self.tx.send(event.kind());
        }
    }

    #[derive(Clone)]
    pub struct FakeFlow {
        tap: String,
        idle_ms: Arc<AtomicUsize>,
    }

    impl FakeFlow {
        pub fn new(tap: &str, idle: Duration) -> Self {
            Self {
                tap: tap.to_string(),
                idle_ms: Arc::new(AtomicUsize::new(idle.as_millis() as usize)),
            }
        }

        pub fn set_idle(&self, idle: Duration) {
            self.idle_ms.store(idle.as_millis() as usize, Ordering::SeqCst);
        }
    }

    impl Flow for FakeFlow {
        fn idle_time(&self) -> Duration {
            Duration::from_millis(self.idle_ms.load(Ordering::SeqCst) as u64)
        }

        fn tap_name(&self) -> &str {
            &self.tap
        }
    }

    pub struct FakeFlows {
        flows: Vec<FakeFlow>,
    }

    impl FakeFlows {
        pub fn new(flows: Vec<FakeFlow>) -> Arc<Self> {
            Arc::new(Self { flows })
        }
    }

    impl FlowManager for FakeFlows {
        fn active_flows(&self) -> Vec<Arc<dyn Flow>> {
            self.flows
                .iter()
                .map(|f| Arc::new(f.clone()) as Arc<dyn Flow>)
                .collect()
        }
    }

    /// Alarm queue that hands out alarms once they are due.
    #[derive(Default)]
    pub struct FakeAlarms {
        pending: Mutex<Vec<Alarm>>,
    }

    impl FakeAlarms {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn schedule(&self, alarm: Alarm) {
            self.pending.lock().push(alarm);
        }

        fn take_due(&self) -> Option<Alarm> {
            let mut pending = self.pending.lock();
            let now = SystemTime::now();
            let idx = pending.iter().position(|a| a.is_due(now))?;
            Some(pending.remove(idx))
        }
    }

    impl AlarmSource for FakeAlarms {
        fn wait_for_next_alarm(&self, timeout: Duration) -> Option<Alarm> {
            let deadline = Instant::now() + timeout;
            loop {
                if let Some(alarm) = self.take_due() {
                    return Some(alarm);
                }
                let left = deadline.checked_duration_since(Instant::now())?;
                thread::sleep(left.min(Duration::from_millis(10)));
            }
        }
    }

    /// Protocol server whose `serve` parks until `stop`.
    #[derive(Default)]
    pub struct FakeServer {
        services: Mutex<Vec<ProtocolService>>,
        serving: Mutex<bool>,
        stopped: Mutex<bool>,
        wake: Condvar,
        stops: AtomicUsize,
    }

    impl FakeServer {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn services(&self) -> Vec<ProtocolService> {
            self.services.lock().clone()
        }

        pub fn is_serving(&self) -> bool {
            *self.serving.lock()
        }

        pub fn stop_calls(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    impl ProtocolServer for FakeServer {
        fn register_service(&self, service: ProtocolService) {
            self.services.lock().push(service);
        }

        fn serve(&self) -> anyhow::Result<()> {
            *self.serving.lock() = true;
            let mut stopped = self.stopped.lock();
            while !*stopped {
                self.wake.wait(&mut stopped);
            }
            drop(stopped);
            *self.serving.lock() = false;
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            *self.stopped.lock() = true;
            self.wake.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::support::*;
    use crate::config::CoreConfig;
    use crate::event::{Event, EventKind, TapIdle};
    use crate::external::Alarm;
    use crate::hub::{Dispatch, LocalHub, Publish, Subscribe};
    use crate::thread::EventSink;
    use crate::runtime::{
        ALARM_FIRER, Collaborators, Core, FLOW_MONITOR, HUB_PUMP, PROTOCOL_HOST, WATCHDOG,
    };
    use crate::workers::{Callback, ProvidesEventBindings};
    use crossbeam::channel;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::{Duration, Instant, SystemTime};

    fn fast_cfg() -> CoreConfig {
        CoreConfig {
            watchdog_interval_ms: Some(100),
            hub_dispatch_timeout_ms: Some(100),
            handler_wait_ms: Some(100),
            flow_scan_interval_ms: Some(100),
            flow_idle_threshold_ms: Some(10_000),
            alarm_wait_ms: Some(100),
            join_timeout_ms: Some(3_000),
            fault_escalation_ms: Some(500),
            ..CoreConfig::default()
        }
    }

    /// Local hub whose dispatcher can be made to blow up.
    #[derive(Default)]
    struct BreakableHub {
        inner: LocalHub,
        broken: AtomicBool,
    }

    impl BreakableHub {
        fn break_dispatch(&self) {
            self.broken.store(true, Ordering::SeqCst);
        }
    }

    impl Publish for BreakableHub {
        fn publish(&self, event: Event) {
            self.inner.publish(event);
        }
    }

    impl Dispatch for BreakableHub {
        fn dispatch_next(&self, timeout: Duration) -> bool {
            if self.broken.load(Ordering::SeqCst) {
                panic!("dispatcher lost its bus connection");
            }
            self.inner.dispatch_next(timeout)
        }
    }

    impl Subscribe for BreakableHub {
        fn subscribe(&self, sink: Arc<dyn EventSink>) {
            self.inner.subscribe(sink);
        }
    }

    struct TapService {
        on_idle: Callback,
        on_heartbeat: Callback,
    }

    impl ProvidesEventBindings for TapService {
        fn service_name(&self) -> &str {
            "tap-service"
        }

        fn event_bindings(&self) -> Vec<(EventKind, Vec<Callback>)> {
            vec![
                (EventKind::FlowDevIdle, vec![self.on_idle.clone()]),
                (EventKind::Heartbeat, vec![self.on_heartbeat.clone()]),
            ]
        }
    }

    fn tap_service() -> (
        Arc<TapService>,
        channel::Receiver<String>,
        channel::Receiver<()>,
    ) {
        let (idle_tx, idle_rx) = channel::unbounded();
        let (beat_tx, beat_rx) = channel::unbounded();
        let svc = TapService {
            on_idle: Callback::new("on_idle", move |ev: &Event| {
                if let Some(p) = ev.payload::<TapIdle>() {
                    idle_tx.send(p.tap_name.clone())?;
                }
                Ok(())
            }),
            on_heartbeat: Callback::new("on_heartbeat", move |_ev: &Event| {
                beat_tx.send(())?;
                Ok(())
            }),
        };
        (Arc::new(svc), idle_rx, beat_rx)
    }

    #[test]
    fn core_registers_all_threads_in_order() {
        let hub = LocalHub::new_arc();
        let collab = Collaborators {
            protocol: Some(FakeServer::new()),
            ..Collaborators::default()
        };
        let mut core = Core::new(fast_cfg(), hub.clone(), collab);
        core.add_handler("handler-main");

        let names: Vec<_> = core
            .registry()
            .snapshot()
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                WATCHDOG,
                HUB_PUMP,
                FLOW_MONITOR,
                ALARM_FIRER,
                PROTOCOL_HOST,
                "handler-main"
            ]
        );
        assert_eq!(hub.subscriber_count(), names.len());
        assert!(!core.any_alive());
    }

    #[test]
    fn events_flow_from_producers_through_hub_to_handlers() {
        let hub = LocalHub::new_arc();
        let alarms = FakeAlarms::new();
        alarms.schedule(Alarm::new(
            "beat",
            SystemTime::now() - Duration::from_secs(1),
            Event::new(EventKind::Heartbeat),
        ));
        let collab = Collaborators {
            flows: FakeFlows::new(vec![FakeFlow::new("A", Duration::from_secs(15))]),
            alarms: alarms.clone(),
            protocol: None,
        };

        let mut core = Core::new(fast_cfg(), hub.clone(), collab);
        let handler = core.add_handler("handler-main");
        let (svc, idle_rx, beat_rx) = tap_service();
        handler.register_service(svc);

        core.start_all().expect("start failed");

        assert_eq!(
            idle_rx.recv_timeout(Duration::from_secs(2)).unwrap(),
            "A"
        );
        assert!(beat_rx.recv_timeout(Duration::from_secs(2)).is_ok());

        assert!(core.shutdown());
        assert!(!core.any_alive());
    }

    #[test]
    fn thread_death_shuts_down_every_thread() {
        let hub = LocalHub::new_arc();
        let server = FakeServer::new();
        let collab = Collaborators {
            protocol: Some(server.clone()),
            ..Collaborators::default()
        };
        let mut core = Core::new(fast_cfg(), hub.clone(), collab);
        core.add_handler("handler-a");
        core.add_handler("handler-b");
        let (body, kill) = ExitOnSignal::new();
        let mortal = core.add_thread("mortal", body);

        core.start_all().unwrap();
        assert!(wait_until(Duration::from_secs(1), || server.is_serving()));

        kill.send(()).unwrap();
        assert!(wait_until(Duration::from_secs(1), || !mortal.is_alive()));

        // Watchdog tick + hub dispatch + the slowest bounded wait.
        let bound = Duration::from_secs(3);
        let start = Instant::now();
        assert!(wait_until(bound, || !core.any_alive()));
        assert!(start.elapsed() < bound);

        assert!(!server.is_serving());
        for t in core.registry().snapshot() {
            if t.name() != "mortal" {
                assert!(t.quit_requested(), "{} did not see quit", t.name());
            }
        }
    }

    #[test]
    fn dispatcher_death_still_stops_every_thread() {
        let hub = Arc::new(BreakableHub::default());
        let server = FakeServer::new();
        let collab = Collaborators {
            protocol: Some(server.clone()),
            ..Collaborators::default()
        };
        let mut core = Core::new(fast_cfg(), hub.clone(), collab);
        core.add_handler("handler-main");
        core.start_all().unwrap();
        assert!(wait_until(Duration::from_secs(1), || server.is_serving()));

        hub.break_dispatch();
        let pump = core.thread(HUB_PUMP).unwrap();
        assert!(wait_until(Duration::from_secs(1), || !pump.is_alive()));
        assert!(!pump.quit_requested());

        // Watchdog tick + escalation delay + the slowest bounded wait.
        assert!(
            wait_until(Duration::from_secs(3), || !core.any_alive()),
            "still running: {:?}",
            core.registry()
                .snapshot()
                .iter()
                .filter(|t| t.is_alive())
                .map(|t| t.name().to_string())
                .collect::<Vec<_>>()
        );
        assert!(!server.is_serving());
        assert_eq!(hub.inner.pending(), 1);
    }

    #[test]
    fn run_blocking_returns_once_threads_stop() {
        let hub = LocalHub::new_arc();
        let mut core = Core::new(fast_cfg(), hub.clone(), Collaborators::default());
        core.add_handler("handler-main");
        core.start_all().unwrap();

        let publisher = hub.clone();
        let stopper = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            publisher.publish(Event::quit());
        });

        let start = Instant::now();
        core.run_blocking().unwrap();
        assert!(start.elapsed() < Duration::from_secs(3));
        assert!(!core.any_alive());
        stopper.join().unwrap();

        // Signal handlers are released, so a second run registers afresh.
        core.run_blocking().unwrap();
    }

    #[test]
    fn repeated_shutdown_events_are_tolerated() {
        let hub = LocalHub::new_arc();
        let mut core = Core::new(fast_cfg(), hub.clone(), Collaborators::default());
        core.add_handler("handler-main");
        core.start_all().unwrap();

        hub.publish(Event::quit());
        hub.publish(Event::quit());
        hub.publish(Event::quit());

        assert!(wait_until(Duration::from_secs(3), || !core.any_alive()));
        assert!(core.shutdown());
    }

    #[test]
    fn shutdown_without_faults_is_clean() {
        let hub = LocalHub::new_arc();
        let mut core = Core::new(fast_cfg(), hub.clone(), Collaborators::default());
        let handler = core.add_handler("handler-main");
        let (svc, _idle_rx, beat_rx) = tap_service();
        handler.register_service(svc);
        core.start_all().unwrap();

        hub.publish(Event::new(EventKind::Heartbeat));
        assert!(beat_rx.recv_timeout(Duration::from_secs(1)).is_ok());

        assert!(core.shutdown());
        assert!(core.registry().snapshot().iter().all(|t| t.quit_requested()));
    }
}
