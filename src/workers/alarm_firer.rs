use crate::event::EventKind;
use crate::external::AlarmSource;
use crate::hub::Publish;
use crate::thread::{ThreadCtx, ThreadLoop};
use std::sync::Arc;
use std::time::Duration;

/// Republishes the event of every alarm that comes due.
pub struct AlarmFirer {
    alarms: Arc<dyn AlarmSource>,
    publisher: Arc<dyn Publish>,
    wait: Duration,
}

impl AlarmFirer {
    pub fn new(alarms: Arc<dyn AlarmSource>, publisher: Arc<dyn Publish>, wait: Duration) -> Self {
        Self {
            alarms,
            publisher,
            wait,
        }
    }

    /// Wait up to `wait` for one due alarm and fire it.
    /// Returns the kind of the event published, if any.
    pub fn poll(&self) -> Option<EventKind> {
        let alarm = self.alarms.wait_for_next_alarm(self.wait)?;
        tracing::info!("[AlarmFirer] firing alarm: {}", alarm.name);
        let kind = alarm.event.kind();
        self.publisher.publish(alarm.event);
        Some(kind)
    }
}

impl ThreadLoop for AlarmFirer {
    fn run(&mut self, ctx: &ThreadCtx) -> anyhow::Result<()> {
        while !ctx.should_quit() {
            self.poll();
        }
        Ok(())
    }
}
