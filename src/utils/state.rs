use arc_swap::ArcSwap;
use crossbeam::utils::CachePadded;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free snapshot cell with versioning.
///
/// Writers build a complete new value and [`publish`](Self::publish) it;
/// readers [`load`](Self::load) whichever snapshot is current. A reader
/// never sees a value that is half rebuilt, and a value a reader holds
/// stays valid after a newer one is swapped in.
///
/// The sequence counter starts at 1 and grows on every publish, so
/// observers can detect replacement without comparing contents.
pub struct SnapshotCell<T> {
    snap: ArcSwap<T>,
    seq: CachePadded<AtomicU64>,
}

impl<T: Send + Sync + 'static> SnapshotCell<T> {
    pub fn new(init: T) -> Self {
        Self {
            snap: ArcSwap::from(Arc::new(init)),
            seq: CachePadded::new(AtomicU64::new(1)),
        }
    }

    /// Replace the current snapshot.
    #[inline]
    pub fn publish(&self, next: T) {
        self.snap.store(Arc::new(next));
        self.seq.fetch_add(1, Ordering::Release);
    }

    /// Current snapshot as an owned [`Arc`].
    #[inline]
    pub fn load(&self) -> Arc<T> {
        self.snap.load_full()
    }

    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq.load(Ordering::Acquire)
    }
}

impl<T: Default + Send + Sync + 'static> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for SnapshotCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotCell")
            .field("seq", &self.seq.load(Ordering::Acquire))
            .finish()
    }
}
