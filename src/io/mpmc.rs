use crate::error::{RecvError, SendError, TryRecvError};
use crate::io::base::{BaseRx, BaseTx};
use crate::utils::{CANCEL_POLL, CancelToken};
use crossbeam::channel as cbchan;
use std::time::{Duration, Instant};

pub struct MpmcChannel;

impl MpmcChannel {
    #[inline]
    pub fn unbounded<T: Send + 'static>() -> (MpmcSender<T>, MpmcReceiver<T>) {
        let (tx, rx) = cbchan::unbounded::<T>();
        (MpmcSender { tx }, MpmcReceiver { rx })
    }
}

#[derive(Clone)]
pub struct MpmcSender<E> {
    tx: cbchan::Sender<E>,
}

impl<E> MpmcSender<E> {
    /// Number of values waiting in the queue.
    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }
}

impl<E: Send + 'static> BaseTx for MpmcSender<E> {
    type EventType = E;

    #[inline]
    fn try_send(&self, a: E) -> Result<(), SendError<E>> {
        match self.tx.try_send(a) {
            Ok(()) => Ok(()),
            Err(cbchan::TrySendError::Full(v)) => Err(SendError::full(v)),
            Err(cbchan::TrySendError::Disconnected(v)) => Err(SendError::closed(v)),
        }
    }
}

pub struct MpmcReceiver<E> {
    rx: cbchan::Receiver<E>,
}

impl<E: Send + 'static> BaseRx for MpmcReceiver<E> {
    type EventType = E;

    #[inline]
    fn try_recv(&self) -> Result<E, TryRecvError> {
        match self.rx.try_recv() {
            Ok(v) => Ok(v),
            Err(cbchan::TryRecvError::Empty) => Err(TryRecvError::Empty),
            Err(cbchan::TryRecvError::Disconnected) => Err(TryRecvError::Disconnected),
        }
    }

    fn recv(&self, cancel: &CancelToken, timeout: Option<Duration>) -> Result<E, RecvError> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if cancel.is_cancelled() {
                return Err(RecvError::Cancelled);
            }

            // Park in short slices so cancellation is seen promptly.
            let slice = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return self.rx.try_recv().map_err(|_| RecvError::Timeout);
                    }
                    (d - now).min(CANCEL_POLL)
                }
                None => CANCEL_POLL,
            };

            match self.rx.recv_timeout(slice) {
                Ok(v) => return Ok(v),
                Err(cbchan::RecvTimeoutError::Timeout) => continue,
                Err(cbchan::RecvTimeoutError::Disconnected) => {
                    return Err(RecvError::Disconnected);
                }
            }
        }
    }
}
