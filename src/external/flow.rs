use std::sync::Arc;
use std::time::Duration;

/// Read-only view of an active pour.
pub trait Flow: Send + Sync {
    /// Time since the flow meter last reported activity.
    fn idle_time(&self) -> Duration;

    /// Name of the tap the flow is on.
    fn tap_name(&self) -> &str;
}

pub trait FlowManager: Send + Sync {
    /// Snapshot of the currently active flows.
    fn active_flows(&self) -> Vec<Arc<dyn Flow>>;
}

/// Flow manager with no flows, for processes without flow meters.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullFlows;

impl FlowManager for NullFlows {
    fn active_flows(&self) -> Vec<Arc<dyn Flow>> {
        Vec::new()
    }
}
