//! Executor instances.
//!
//! Each executor instance is one consumer, its private
//! [`PendingSet`](crate::queue::PendingSet), and the wait gate built on the
//! same lock. Three variants share that primitive:
//!
//! - [`background`]: a fixed pool of independent single-threaded workers,
//! - [`ui`]: one consumer whose batches run on the UI toolkit's event thread,
//! - [`engine`]: one queue with no thread, drained by the render loop once
//!   per frame.
//!
//! The drain → park-if-empty → execute → reconcile cycle shared by the two
//! threaded variants lives in [`consumer`].

pub(crate) mod background;
pub(crate) mod consumer;
pub(crate) mod engine;
pub(crate) mod report;
pub(crate) mod state;
pub(crate) mod ui;

use crate::error::SubmitError;
use crate::task::Task;

pub use background::{BackgroundPool, BatchPolicy};
pub use engine::EngineQueue;
pub use report::ExecutionReport;
pub use state::Lifecycle;
pub use ui::{Rejected, UiExecutor, UiJob, UiThread};

/// What happens to queued tasks when an executor stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopPolicy {
    /// Run everything that was queued before the stop.
    #[default]
    Drain,

    /// Drop queued tasks without running them.
    Discard,
}

/// Fire-and-forget submission to an executor.
///
/// Submission never waits for the consumer. The only error is
/// [`SubmitError::Stopped`], returned once the executor has begun stopping.
///
/// Callers must not block indefinitely inside a task, and must not
/// synchronously wait for a second task submitted to the same executor: the
/// second task can only run after the first returns.
pub trait Submit {
    /// Queues a prebuilt task.
    fn submit_task(&self, task: Task) -> Result<(), SubmitError>;

    /// Queues a closure.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// dispatcher.engine().submit(move || scene.mark_dirty(node))?;
    /// ```
    fn submit<F>(&self, f: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
        Self: Sized,
    {
        self.submit_task(Task::new(f))
    }
}
