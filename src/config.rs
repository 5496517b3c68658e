use crate::utils::logger::LoggerConfig;
use crate::utils::params_io::load_cfg_merge;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_WATCHDOG_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_HUB_DISPATCH_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_HANDLER_WAIT_MS: u64 = 500;
pub const DEFAULT_FLOW_SCAN_INTERVAL_MS: u64 = 2_000;
pub const DEFAULT_FLOW_IDLE_THRESHOLD_MS: u64 = 10_000;
pub const DEFAULT_ALARM_WAIT_MS: u64 = 1_000;
pub const DEFAULT_JOIN_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_FAULT_ESCALATION_MS: u64 = 5_000;

/// Environment variable prefix for overrides, e.g. `KEGCORE__HANDLER_WAIT_MS=250`.
pub const ENV_PREFIX: &str = "KEGCORE";

/// Timing knobs of the core threads. Every field is optional; unset
/// fields take the `DEFAULT_*` values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CoreConfig {
    pub watchdog_interval_ms: Option<u64>,
    pub hub_dispatch_timeout_ms: Option<u64>,
    pub handler_wait_ms: Option<u64>,
    pub flow_scan_interval_ms: Option<u64>,
    pub flow_idle_threshold_ms: Option<u64>,
    pub alarm_wait_ms: Option<u64>,
    pub join_timeout_ms: Option<u64>,
    /// How long after a fault the watchdog waits for the shutdown event to
    /// take effect before requesting quit on every thread itself.
    pub fault_escalation_ms: Option<u64>,
    /// Process events still queued on a handler after it quits.
    pub drain_on_quit: Option<bool>,
    #[serde(default)]
    pub logger: LoggerConfig,
}

impl CoreConfig {
    /// Load from `path` (skipped if missing) overlaid with `KEGCORE__*`
    /// environment variables.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        load_cfg_merge([path], Some(ENV_PREFIX))
    }

    pub fn watchdog_interval(&self) -> Duration {
        ms(self.watchdog_interval_ms, DEFAULT_WATCHDOG_INTERVAL_MS)
    }

    pub fn hub_dispatch_timeout(&self) -> Duration {
        ms(self.hub_dispatch_timeout_ms, DEFAULT_HUB_DISPATCH_TIMEOUT_MS)
    }

    pub fn handler_wait(&self) -> Duration {
        ms(self.handler_wait_ms, DEFAULT_HANDLER_WAIT_MS)
    }

    pub fn flow_scan_interval(&self) -> Duration {
        ms(self.flow_scan_interval_ms, DEFAULT_FLOW_SCAN_INTERVAL_MS)
    }

    pub fn flow_idle_threshold(&self) -> Duration {
        ms(self.flow_idle_threshold_ms, DEFAULT_FLOW_IDLE_THRESHOLD_MS)
    }

    pub fn alarm_wait(&self) -> Duration {
        ms(self.alarm_wait_ms, DEFAULT_ALARM_WAIT_MS)
    }

    pub fn join_timeout(&self) -> Duration {
        ms(self.join_timeout_ms, DEFAULT_JOIN_TIMEOUT_MS)
    }

    pub fn fault_escalation(&self) -> Duration {
        ms(self.fault_escalation_ms, DEFAULT_FAULT_ESCALATION_MS)
    }

    pub fn drain_on_quit(&self) -> bool {
        self.drain_on_quit.unwrap_or(true)
    }

    /// Longest bounded wait any core thread uses; an upper bound on how
    /// long a quit takes to be observed.
    pub fn max_quit_latency(&self) -> Duration {
        [
            self.watchdog_interval(),
            self.hub_dispatch_timeout(),
            self.handler_wait(),
            self.flow_scan_interval(),
            self.alarm_wait(),
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }
}

#[inline]
fn ms(value: Option<u64>, default: u64) -> Duration {
    Duration::from_millis(value.unwrap_or(default))
}
