use std::{error::Error, fmt, io};

const ERR_MSG_QUEUE_FULL: &str = "event queue is full";
const ERR_MSG_QUEUE_CLOSED: &str = "event queue is closed";
const ERR_MSG_TIMEOUT: &str = "operation timed out";
const ERR_MSG_DISCONNECTED: &str = "queue disconnected";
const ERR_MSG_CANCELLED: &str = "operation cancelled";

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SendFailReason {
    Full,
    Closed,
}

impl fmt::Display for SendFailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendFailReason::Full => write!(f, "{ERR_MSG_QUEUE_FULL}"),
            SendFailReason::Closed => write!(f, "{ERR_MSG_QUEUE_CLOSED}"),
        }
    }
}

/// A rejected send. The value is handed back to the caller.
#[derive(Debug)]
pub struct SendError<T> {
    pub value: T,
    pub reason: SendFailReason,
}

impl<T> SendError<T> {
    pub fn full(value: T) -> Self {
        Self {
            value,
            reason: SendFailReason::Full,
        }
    }

    pub fn closed(value: T) -> Self {
        Self {
            value,
            reason: SendFailReason::Closed,
        }
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.reason.fmt(f)
    }
}

impl<T: fmt::Debug> Error for SendError<T> {}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TryRecvError {
    Empty,
    Disconnected,
}

/// Outcome of a bounded, cancellable receive that produced no value.
/// `Timeout` is the normal idle case, not a failure.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RecvError {
    Timeout,
    Disconnected,
    Cancelled,
}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvError::Timeout => write!(f, "{ERR_MSG_TIMEOUT}"),
            RecvError::Disconnected => write!(f, "{ERR_MSG_DISCONNECTED}"),
            RecvError::Cancelled => write!(f, "{ERR_MSG_CANCELLED}"),
        }
    }
}

impl Error for RecvError {}

/// Lifecycle errors of a supervised thread.
#[derive(Debug)]
pub enum ThreadError {
    /// `start` was called on a thread that already ran.
    AlreadyStarted(String),
    /// The OS refused to spawn the thread.
    Spawn { name: String, source: io::Error },
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::AlreadyStarted(name) => write!(f, "thread {name} already started"),
            ThreadError::Spawn { name, source } => {
                write!(f, "failed to spawn thread {name}: {source}")
            }
        }
    }
}

impl Error for ThreadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ThreadError::Spawn { source, .. } => Some(source),
            ThreadError::AlreadyStarted(_) => None,
        }
    }
}
