use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Handle used to cancel a task created with
/// [`Task::cancellable`](super::Task::cancellable).
///
/// Cancellation is checked once, when the executor picks the task up. A task
/// whose body has already started runs to completion. Cancelling never
/// removes the task from its queue; it is still drained and counted as
/// skipped.
///
/// Handles are cheap to clone and may be moved to any thread.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    pub(crate) fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns `true` if [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
