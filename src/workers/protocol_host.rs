use crate::external::{ProtocolServer, ProtocolService};
use crate::thread::{QuitHook, ThreadCtx, ThreadLoop};
use anyhow::Context;
use std::sync::Arc;

/// Services every protocol host exposes, in registration order.
pub const DEFAULT_SERVICES: [ProtocolService; 2] = [ProtocolService::Base, ProtocolService::Flow];

/// Runs the network protocol server on its own thread.
///
/// The server's `serve` is the only blocking point and it ignores the
/// cancel token, so quitting goes through the quit hook, which stops the
/// server and lets `serve` return.
pub struct ProtocolHost {
    server: Arc<dyn ProtocolServer>,
}

impl ProtocolHost {
    pub fn new(server: Arc<dyn ProtocolServer>) -> Self {
        Self::with_services(server, &DEFAULT_SERVICES)
    }

    pub fn with_services(server: Arc<dyn ProtocolServer>, services: &[ProtocolService]) -> Self {
        for svc in services {
            tracing::debug!("[ProtocolHost] registering {} service", svc);
            server.register_service(*svc);
        }
        Self { server }
    }
}

impl ThreadLoop for ProtocolHost {
    fn run(&mut self, ctx: &ThreadCtx) -> anyhow::Result<()> {
        if ctx.should_quit() {
            return Ok(());
        }
        // A quit after this check has already stopped the server, and
        // `ProtocolServer::stop` is sticky, so `serve` returns at once.
        tracing::info!("[ProtocolHost] network thread started");
        self.server.serve().context("protocol server failed")?;
        tracing::info!("[ProtocolHost] network thread stopped");
        Ok(())
    }

    fn quit_hook(&self) -> Option<QuitHook> {
        let server = self.server.clone();
        Some(Box::new(move || {
            tracing::info!("[ProtocolHost] stopping server");
            server.stop();
        }))
    }
}
