use anyhow::Context;
use kegcore::prelude::*;
use kegcore::utils::logger::LoggerConfig;
use kegcore::utils::params_io::take_from_args;
use std::sync::Arc;

const DEFAULT_CONFIG: &str = "kegcore.toml";

/// Logs every idled-out tap.
struct IdleLogger {
    on_idle: Callback,
}

impl IdleLogger {
    fn new() -> Self {
        Self {
            on_idle: Callback::new("log_idle_tap", |ev: &Event| {
                if let Some(p) = ev.payload::<TapIdle>() {
                    tracing::info!("tap {} went idle", p.tap_name);
                }
                Ok(())
            }),
        }
    }
}

impl ProvidesEventBindings for IdleLogger {
    fn service_name(&self) -> &str {
        "idle-logger"
    }

    fn event_bindings(&self) -> Vec<(EventKind, Vec<Callback>)> {
        vec![(EventKind::FlowDevIdle, vec![self.on_idle.clone()])]
    }
}

pub fn main() -> anyhow::Result<()> {
    let arg = take_from_args(1);
    let path = arg.clone().unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let cfg = CoreConfig::load(&path).with_context(|| format!("loading {path}"))?;
    // Without an explicit config file, logging follows the LOG_* variables.
    let logger = match arg {
        Some(_) => cfg.logger.clone(),
        None => LoggerConfig::from_env(),
    };
    let _log_guard = logger.init()?;

    tracing::info!("kegcore starting with {:?}", cfg);

    let hub = LocalHub::new_arc();
    let mut core = Core::new(cfg, hub, Collaborators::default());
    let handler = core.add_handler("handler-main");
    handler.register_service(Arc::new(IdleLogger::new()));

    core.start_all()?;
    core.run_blocking()
}
