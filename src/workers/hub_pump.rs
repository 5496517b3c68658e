use crate::hub::Dispatch;
use crate::thread::{ThreadCtx, ThreadLoop};
use std::sync::Arc;
use std::time::Duration;

/// Gives the hub's central dispatch its own thread.
pub struct HubPump {
    hub: Arc<dyn Dispatch>,
    timeout: Duration,
}

impl HubPump {
    pub fn new(hub: Arc<dyn Dispatch>, timeout: Duration) -> Self {
        Self { hub, timeout }
    }
}

impl ThreadLoop for HubPump {
    fn run(&mut self, ctx: &ThreadCtx) -> anyhow::Result<()> {
        while !ctx.should_quit() {
            self.hub.dispatch_next(self.timeout);
        }
        Ok(())
    }
}
