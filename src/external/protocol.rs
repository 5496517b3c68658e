use std::fmt;

/// Services the protocol server can expose.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum ProtocolService {
    /// Ping, status and other session-level requests.
    Base,
    /// Flow meter updates and tap queries.
    Flow,
}

impl fmt::Display for ProtocolService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolService::Base => f.write_str("base"),
            ProtocolService::Flow => f.write_str("flow"),
        }
    }
}

/// Network protocol server. `serve` blocks until `stop` is called from
/// another thread.
pub trait ProtocolServer: Send + Sync {
    fn register_service(&self, service: ProtocolService);

    fn serve(&self) -> anyhow::Result<()>;

    /// Must be sticky: a `stop` that lands before `serve` is entered makes
    /// the next `serve` return at once. The host's quit hook can fire
    /// between its last quit check and the call to `serve`.
    fn stop(&self);
}
