//! A counting join point.
//!
//! The container uses a [`WaitGroup`] internally to learn when every bar actor has shut down,
//! and callers may hand in their own so that [`Progress::wait`](crate::Progress::wait) also
//! joins their worker threads.

use std::{fmt, sync::Arc};

use parking_lot::{Condvar, Mutex};

/// A cloneable counter that lets one thread block until a set of tasks has finished.
///
/// Every [`add`](Self::add) must be balanced by a [`done`](Self::done). Clones share the same
/// counter.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    count: Mutex<usize>,
    zero: Condvar,
}

impl fmt::Debug for WaitGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitGroup")
            .field("count", &*self.inner.count.lock())
            .finish()
    }
}

impl WaitGroup {
    /// Creates a wait group with a zero count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `n` more tasks.
    pub fn add(&self, n: usize) {
        *self.inner.count.lock() += n;
    }

    /// Marks one task as finished, waking waiters when the count reaches zero.
    ///
    /// Extra calls past zero are ignored.
    pub fn done(&self) {
        let mut count = self.inner.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.inner.zero.notify_all();
        }
    }

    /// Blocks until the count reaches zero.
    pub fn wait(&self) {
        let mut count = self.inner.count.lock();
        while *count > 0 {
            self.inner.zero.wait(&mut count);
        }
    }

    /// Current number of outstanding tasks.
    #[must_use]
    pub fn count(&self) -> usize {
        *self.inner.count.lock()
    }
}

/// Calls [`WaitGroup::done`] when dropped, so a task is accounted for even if it unwinds.
pub(crate) struct DoneGuard(pub(crate) WaitGroup);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.done();
    }
}
