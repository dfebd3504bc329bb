//! In-flight flag shared by every store action.
//!
//! Actions hold a [`LoadingGuard`] for their whole body. Dropping the guard
//! restores the value seen on entry, so a nested action leaves the outer one
//! marked as loading and a cancelled future still clears the flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub(crate) struct LoadingFlag(Arc<AtomicBool>);

impl LoadingFlag {
    pub(crate) fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Mark the store busy until the returned guard is dropped.
    pub(crate) fn begin(&self) -> LoadingGuard {
        let previous = self.0.swap(true, Ordering::SeqCst);
        LoadingGuard {
            flag: Arc::clone(&self.0),
            previous,
        }
    }
}

// A cloned snapshot gets its own flag.
impl Clone for LoadingFlag {
    fn clone(&self) -> Self {
        Self(Arc::new(AtomicBool::new(self.get())))
    }
}

#[must_use = "the store is only marked busy while the guard is alive"]
pub(crate) struct LoadingGuard {
    flag: Arc<AtomicBool>,
    previous: bool,
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.flag.store(self.previous, Ordering::SeqCst);
    }
}
