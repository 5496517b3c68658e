use crate::event::Event;
use std::time::{Duration, SystemTime};

/// A scheduled event. Owned by the alarm facility; the core only reads it.
#[derive(Debug, Clone)]
pub struct Alarm {
    pub name: String,
    pub due: SystemTime,
    pub event: Event,
}

impl Alarm {
    pub fn new(name: impl Into<String>, due: SystemTime, event: Event) -> Self {
        Self {
            name: name.into(),
            due,
            event,
        }
    }

    pub fn is_due(&self, now: SystemTime) -> bool {
        self.due <= now
    }
}

pub trait AlarmSource: Send + Sync {
    /// Block for at most `timeout` and return the next alarm that came due,
    /// or `None` if nothing came due in that window.
    fn wait_for_next_alarm(&self, timeout: Duration) -> Option<Alarm>;
}

/// Alarm source that never fires. Waits out the timeout so callers keep
/// their normal cadence.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAlarms;

impl AlarmSource for NullAlarms {
    fn wait_for_next_alarm(&self, timeout: Duration) -> Option<Alarm> {
        std::thread::sleep(timeout);
        None
    }
}
