use crate::event::{Event, EventKind, TapIdle};
use crate::external::{Flow, FlowManager};
use crate::hub::Publish;
use crate::thread::{ThreadCtx, ThreadLoop};
use std::sync::Arc;
use std::time::Duration;

/// Publishes [`EventKind::FlowDevIdle`] for flows that stopped pouring.
///
/// A flow idle for at least the threshold is reported on every scan it
/// is seen in; consumers treat repeats as the same notification.
pub struct IdleFlowMonitor {
    flows: Arc<dyn FlowManager>,
    publisher: Arc<dyn Publish>,
    scan_interval: Duration,
    idle_threshold: Duration,
}

impl IdleFlowMonitor {
    pub fn new(
        flows: Arc<dyn FlowManager>,
        publisher: Arc<dyn Publish>,
        scan_interval: Duration,
        idle_threshold: Duration,
    ) -> Self {
        Self {
            flows,
            publisher,
            scan_interval,
            idle_threshold,
        }
    }

    /// Check every active flow once. Returns how many were idled out.
    pub fn scan(&self) -> usize {
        let mut idled = 0;
        for flow in self.flows.active_flows() {
            if flow.idle_time() >= self.idle_threshold {
                self.idle_out(flow.as_ref());
                idled += 1;
            }
        }
        idled
    }

    fn idle_out(&self, flow: &dyn Flow) {
        tracing::info!(
            "[FlowMonitor] idling flow on tap {} (idle {:?})",
            flow.tap_name(),
            flow.idle_time()
        );
        self.publisher.publish(Event::with_payload(
            EventKind::FlowDevIdle,
            TapIdle {
                tap_name: flow.tap_name().to_string(),
            },
        ));
    }
}

impl ThreadLoop for IdleFlowMonitor {
    fn run(&mut self, ctx: &ThreadCtx) -> anyhow::Result<()> {
        while ctx.cancel().sleep_cancellable(self.scan_interval) {
            self.scan();
        }
        Ok(())
    }
}
