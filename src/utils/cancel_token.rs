use std::fmt;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Granularity of every cancellable wait in the crate.
pub const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Shared cancellation state. A child state observes its parent,
/// so cancelling the parent cancels every descendant.
struct CancelState {
    cancelled: AtomicBool,
    parent: Option<Arc<CancelState>>,
}

impl CancelState {
    #[inline]
    fn new_root() -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            parent: None,
        })
    }

    #[inline]
    fn child_of(parent: Arc<CancelState>) -> Arc<Self> {
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            parent: Some(parent),
        })
    }

    /// Returns `true` if this call flipped the flag.
    #[inline]
    fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    #[inline]
    fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        match self.parent {
            Some(ref p) => p.is_cancelled(),
            None => false,
        }
    }
}

/// Cooperative quit signal handed to every supervised loop.
///
/// Nothing in the crate interrupts a thread: loops observe the token at
/// their bounded suspension points and return on their own. Clones share
/// the same state; [`new_child`](Self::new_child) links a token to a parent.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new_root()
    }
}

impl CancelToken {
    /// Create a new root token.
    #[inline]
    pub fn new_root() -> Self {
        Self {
            state: CancelState::new_root(),
        }
    }

    /// Create a token cancelled together with this one.
    #[inline]
    pub fn new_child(&self) -> Self {
        Self {
            state: CancelState::child_of(self.state.clone()),
        }
    }

    /// Cancel this token and all of its children.
    /// Returns `true` only for the call that actually cancelled it.
    #[inline]
    pub fn cancel(&self) -> bool {
        self.state.cancel()
    }

    /// Check if this token (or any ancestor) has been cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Sleep for `total` unless cancelled first.
    /// Returns `false` if the sleep was cut short by cancellation.
    pub fn sleep_cancellable(&self, total: Duration) -> bool {
        let deadline = Instant::now() + total;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(CANCEL_POLL.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_cancels_children() {
        let root = CancelToken::new_root();
        let child = root.new_child();
        let grandchild = child.new_child();

        assert!(!grandchild.is_cancelled());
        assert!(root.cancel());
        assert!(child.is_cancelled());
        assert!(grandchild.is_cancelled());
    }

    #[test]
    fn child_does_not_cancel_parent() {
        let root = CancelToken::new_root();
        let child = root.new_child();
        child.cancel();
        assert!(!root.is_cancelled());
    }

    #[test]
    fn cancel_reports_first_call_only() {
        let token = CancelToken::new_root();
        assert!(token.cancel());
        assert!(!token.cancel());
    }

    #[test]
    fn sleep_returns_early_on_cancel() {
        let token = CancelToken::new_root();
        let remote = token.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            remote.cancel();
        });

        let start = Instant::now();
        assert!(!token.sleep_cancellable(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(2));
        t.join().unwrap();
    }

    #[test]
    fn sleep_completes_when_not_cancelled() {
        let token = CancelToken::new_root();
        assert!(token.sleep_cancellable(Duration::from_millis(60)));
    }
}
