//! The core threads. Each type here is a [`ThreadLoop`](crate::thread::ThreadLoop)
//! body run inside a [`SupervisedThread`](crate::thread::SupervisedThread).

pub mod alarm_firer;
pub mod flow_monitor;
pub mod handler;
pub mod hub_pump;
pub mod protocol_host;
pub mod watchdog;

pub use alarm_firer::AlarmFirer;
pub use flow_monitor::IdleFlowMonitor;
pub use handler::{
    BindingMap, Callback, CallbackId, EventHandlerThread, HandlerHandle, ProvidesEventBindings,
    StepOutcome,
};
pub use hub_pump::HubPump;
pub use protocol_host::ProtocolHost;
pub use watchdog::Watchdog;
