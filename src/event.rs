use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Closed set of event kinds routed through the controller.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum EventKind {
    /// Coordinated shutdown. Every supervised thread stops on it.
    Quit,
    FlowDevIdle,
    FlowDevActivity,
    FlowStart,
    FlowUpdate,
    FlowEnd,
    DrinkCreated,
    ThermoUpdate,
    AuthTokenAdded,
    AuthTokenRemoved,
    Heartbeat,
}

impl EventKind {
    pub const ALL: [EventKind; 11] = [
        EventKind::Quit,
        EventKind::FlowDevIdle,
        EventKind::FlowDevActivity,
        EventKind::FlowStart,
        EventKind::FlowUpdate,
        EventKind::FlowEnd,
        EventKind::DrinkCreated,
        EventKind::ThermoUpdate,
        EventKind::AuthTokenAdded,
        EventKind::AuthTokenRemoved,
        EventKind::Heartbeat,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Quit => "quit",
            EventKind::FlowDevIdle => "flow_dev_idle",
            EventKind::FlowDevActivity => "flow_dev_activity",
            EventKind::FlowStart => "flow_start",
            EventKind::FlowUpdate => "flow_update",
            EventKind::FlowEnd => "flow_end",
            EventKind::DrinkCreated => "drink_created",
            EventKind::ThermoUpdate => "thermo_update",
            EventKind::AuthTokenAdded => "auth_token_added",
            EventKind::AuthTokenRemoved => "auth_token_removed",
            EventKind::Heartbeat => "heartbeat",
        }
    }

    #[inline]
    pub fn is_quit(&self) -> bool {
        matches!(self, EventKind::Quit)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque event payload. Consumers downcast to the type they expect.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Immutable notification routed by kind. Clones share the payload.
#[derive(Clone)]
pub struct Event {
    kind: EventKind,
    payload: Option<Payload>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            payload: None,
        }
    }

    pub fn with_payload<T: Any + Send + Sync>(kind: EventKind, payload: T) -> Self {
        Self {
            kind,
            payload: Some(Arc::new(payload)),
        }
    }

    /// The shutdown event.
    pub fn quit() -> Self {
        Self::new(EventKind::Quit)
    }

    #[inline]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    #[inline]
    pub fn is_quit(&self) -> bool {
        self.kind.is_quit()
    }

    /// Borrow the payload as `T`, if there is one of that type.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_deref()?.downcast_ref::<T>()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}

impl From<EventKind> for Event {
    fn from(kind: EventKind) -> Self {
        Event::new(kind)
    }
}

/// Payload of [`EventKind::FlowDevIdle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TapIdle {
    pub tap_name: String,
}
