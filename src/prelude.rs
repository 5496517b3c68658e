pub use crate::config::CoreConfig;
pub use crate::event::{Event, EventKind, Payload, TapIdle};
pub use crate::external::{
    Alarm, AlarmSource, Flow, FlowManager, NullAlarms, NullFlows, ProtocolServer, ProtocolService,
};
pub use crate::hub::{Dispatch, LocalHub, Publish, Subscribe};
pub use crate::runtime::{Collaborators, Core};
pub use crate::thread::{
    EventSink, QuitHook, SupervisedThread, ThreadCtx, ThreadLoop, ThreadRegistry,
};
pub use crate::utils::{CancelToken, HealthFlag};
pub use crate::workers::{Callback, EventHandlerThread, HandlerHandle, ProvidesEventBindings};
