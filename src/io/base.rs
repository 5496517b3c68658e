use crate::error::{RecvError, SendError, TryRecvError};
use crate::utils::CancelToken;
use std::time::Duration;

/// Sending half of an event transport. Shared by reference across threads.
pub trait BaseTx: Send + Sync + 'static {
    type EventType: Send + 'static;

    /// Non-blocking send. Returns `Err` if the queue is full or its
    /// receiver is gone.
    fn try_send(&self, a: Self::EventType) -> Result<(), SendError<Self::EventType>>;
}

/// Receiving half of an event transport. Owned by a single consumer.
pub trait BaseRx: Send + 'static {
    type EventType: Send + 'static;

    /// Non-blocking receive.
    fn try_recv(&self) -> Result<Self::EventType, TryRecvError>;

    /// Wait for the next value until `timeout` elapses or `cancel` fires.
    /// `None` waits until cancelled.
    fn recv(
        &self,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<Self::EventType, RecvError>;
}
