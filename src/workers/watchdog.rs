use crate::event::Event;
use crate::hub::Publish;
use crate::thread::{ThreadCtx, ThreadLoop, ThreadRegistry};
use crate::utils::CancelToken;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Turns the first unexpected thread death into a process-wide shutdown.
///
/// Every tick the registry is scanned. A thread that was started, is no
/// longer alive and never had quit requested has died on its own: the
/// watchdog logs it and publishes a single shutdown event. Later faults
/// (usually the cascade from the first) are not reported again; the
/// watchdog keeps ticking until its own quit.
///
/// The shutdown event needs a live hub dispatcher to reach anyone. With
/// an escalation delay set, threads still running that long after the
/// fault (the dispatcher itself may be the one that died) get quit
/// requested directly, once.
pub struct Watchdog {
    registry: ThreadRegistry,
    publisher: Arc<dyn Publish>,
    interval: Duration,
    fault_detected: bool,
    escalate_after: Option<Duration>,
    fault_at: Option<Instant>,
    escalated: bool,
}

impl Watchdog {
    pub fn new(registry: ThreadRegistry, publisher: Arc<dyn Publish>, interval: Duration) -> Self {
        Self {
            registry,
            publisher,
            interval,
            fault_detected: false,
            escalate_after: None,
            fault_at: None,
            escalated: false,
        }
    }

    pub fn with_escalation(mut self, after: Duration) -> Self {
        self.escalate_after = Some(after);
        self
    }

    pub fn fault_detected(&self) -> bool {
        self.fault_detected
    }

    /// One pass over the registry. Returns the name of the dead thread when
    /// this pass raised the fault.
    pub fn scan(&mut self, cancel: &CancelToken) -> Option<String> {
        if self.fault_detected {
            self.escalate_if_stuck(cancel);
            return None;
        }

        for thr in self.registry.snapshot() {
            if !thr.has_started() {
                continue;
            }
            if !cancel.is_cancelled() && !thr.is_alive() && !thr.quit_requested() {
                tracing::error!("[Watchdog] thread {} died unexpectedly", thr.name());
                self.publisher.publish(Event::quit());
                self.fault_detected = true;
                self.fault_at = Some(Instant::now());
                return Some(thr.name().to_string());
            }
        }
        None
    }

    /// Returns `true` if this call requested quit on the remaining threads.
    fn escalate_if_stuck(&mut self, cancel: &CancelToken) -> bool {
        let (Some(after), Some(fault_at)) = (self.escalate_after, self.fault_at) else {
            return false;
        };
        if self.escalated || cancel.is_cancelled() || fault_at.elapsed() < after {
            return false;
        }
        self.escalated = true;

        let stuck: Vec<_> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|t| t.is_alive() && !t.quit_requested())
            .collect();
        if stuck.is_empty() {
            return false;
        }

        tracing::error!(
            "[Watchdog] {} threads ignored shutdown for {:?}, requesting quit directly",
            stuck.len(),
            after
        );
        for thr in stuck {
            thr.request_quit();
        }
        true
    }
}

impl ThreadLoop for Watchdog {
    fn run(&mut self, ctx: &ThreadCtx) -> anyhow::Result<()> {
        while !ctx.should_quit() {
            self.scan(ctx.cancel());
            if !ctx.cancel().sleep_cancellable(self.interval) {
                break;
            }
        }
        Ok(())
    }
}
