use super::consumer::Shared;
use super::report::ExecutionReport;
use super::{StopPolicy, Submit};
use crate::error::SubmitError;
use crate::queue::Batch;
use crate::stats::ExecutorStats;
use crate::task::Task;

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

/// The engine-affined executor.
///
/// It has no thread and never parks: the render loop pulls from it once per
/// frame with [`drain_frame`](Self::drain_frame), which runs every task
/// queued so far on the calling thread. Tasks submitted while a frame is
/// being drained (including by the tasks themselves) run on the next frame.
///
/// Only one thread drains at a time. A second thread calling
/// [`drain_frame`](Self::drain_frame) or [`stop`](Self::stop) waits for the
/// drain in progress to finish; a task draining its own queue gets an empty
/// report.
///
/// # Examples
///
/// ```rust,ignore
/// loop {
///     let report = dispatcher.engine().drain_frame();
///     renderer.render(&scene);
/// }
/// ```
pub struct EngineQueue {
    shared: Arc<Shared>,

    /// Thread currently draining, if any.
    drainer: Mutex<Option<ThreadId>>,
    drained: Condvar,
}

/// Clears the drainer slot when a drain ends.
struct DrainGuard<'a> {
    queue: &'a EngineQueue,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        *self.queue.lock_drainer() = None;
        self.queue.drained.notify_all();
    }
}

impl EngineQueue {
    /// Creates an engine queue; it accepts submissions immediately.
    pub fn new(name: &str) -> Self {
        let shared = Shared::new(name);
        shared.pending.set_running();

        Self {
            shared,
            drainer: Mutex::new(None),
            drained: Condvar::new(),
        }
    }

    fn lock_drainer(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.drainer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Becomes the draining thread, waiting for another drain to end first.
    ///
    /// Returns `None` if the current thread is already draining.
    fn begin_drain(&self) -> Option<DrainGuard<'_>> {
        let current = thread::current().id();
        let mut drainer = self.lock_drainer();

        loop {
            let draining = *drainer;
            match draining {
                Some(id) if id == current => return None,
                Some(_) => {
                    drainer = self
                        .drained
                        .wait(drainer)
                        .unwrap_or_else(PoisonError::into_inner)
                }
                None => break,
            }
        }

        *drainer = Some(current);
        Some(DrainGuard { queue: self })
    }

    /// Swaps out everything queued and runs it on the current thread.
    ///
    /// Returns what was executed. A drain with nothing queued executes
    /// nothing and does not count as an iteration. Called from a task of
    /// this queue, it returns an empty report.
    pub fn drain_frame(&self) -> ExecutionReport {
        self.drain().unwrap_or_default()
    }

    fn drain(&self) -> Option<ExecutionReport> {
        let _guard = self.begin_drain()?;

        let mut report = ExecutionReport::default();
        let mut batch = Batch::new();

        self.shared.pending.swap_into(&mut batch);

        if batch.is_empty() {
            return Some(report);
        }

        self.shared.counters.iteration();

        while let Some(task) = batch.pop_front() {
            report.run(&self.shared.name, task);
        }

        self.shared.counters.record(&report);
        Some(report)
    }

    /// Tasks waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.shared.pending.len()
    }

    /// Stops accepting submissions.
    ///
    /// With [`StopPolicy::Drain`] the remaining tasks are run on the calling
    /// thread once any frame in progress on the render thread has finished.
    /// Called from an engine task, the remaining tasks are left for the
    /// drain in progress to pick up on its next frame.
    pub fn stop(&self, policy: StopPolicy) {
        self.shared.close(policy);

        if policy == StopPolicy::Drain {
            while self.pending() > 0 {
                if self.drain().is_none() {
                    tracing::debug!(
                        executor = %self.shared.name,
                        count = self.pending(),
                        "engine queue stopped from an engine task; leaving tasks for the next frame"
                    );
                    break;
                }
            }
        }

        self.shared.pending.mark_stopped();
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> ExecutorStats {
        self.shared.stats()
    }
}

impl Submit for EngineQueue {
    fn submit_task(&self, task: Task) -> Result<(), SubmitError> {
        self.shared.submit(task)
    }
}
