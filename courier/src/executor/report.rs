use crate::task::{Outcome, Task};

/// Tally of one drain: how many tasks finished and how.
///
/// Returned by [`EngineQueue::drain_frame`](crate::EngineQueue::drain_frame)
/// and accumulated internally by the threaded executors.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Tasks whose body returned normally.
    pub completed: usize,

    /// Tasks that panicked or returned an error.
    pub failed: usize,

    /// Cancelled tasks whose body never started.
    pub skipped: usize,
}

impl ExecutionReport {
    /// Total number of tasks taken off the queue and finished, whatever the
    /// outcome.
    pub fn executed(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    /// Returns `true` if nothing was executed.
    pub fn is_empty(&self) -> bool {
        self.executed() == 0
    }

    /// Runs `task` on the current thread and records its outcome.
    ///
    /// Failures are logged here and go no further.
    pub(crate) fn run(&mut self, executor: &str, task: Task) {
        let id = task.id();

        match task.run() {
            Outcome::Completed => self.completed += 1,
            Outcome::Skipped => {
                self.skipped += 1;
                tracing::trace!(executor, task = %id, "cancelled task skipped");
            }
            Outcome::Failed(failure) => {
                self.failed += 1;
                tracing::warn!(executor, task = %id, error = %failure, "task failed");
            }
        }
    }

    pub(crate) fn merge(&mut self, other: ExecutionReport) {
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}
