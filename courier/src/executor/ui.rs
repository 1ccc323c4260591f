use super::consumer::{Consumer, Execute, Shared};
use super::report::ExecutionReport;
use super::{StopPolicy, Submit};
use crate::error::{BuildError, HandoffError, SubmitError};
use crate::queue::Batch;
use crate::stats::ExecutorStats;
use crate::task::Task;

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Default number of tasks handed to the UI thread per iteration.
pub(crate) const DEFAULT_BATCH_LIMIT: usize = 256;

/// Default pause before retrying a rejected hand-off.
pub(crate) const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// A batch of UI tasks in transit to the UI thread.
///
/// A [`UiThread`] implementation moves the job to its event thread, calls
/// [`run`](Self::run) there, and hands the job back once it returns.
pub struct UiJob {
    executor: Arc<str>,
    batch: Batch,
    report: ExecutionReport,
}

impl UiJob {
    pub(crate) fn new(executor: Arc<str>, batch: Batch) -> Self {
        Self {
            executor,
            batch,
            report: ExecutionReport::default(),
        }
    }

    /// Runs every task in the job on the current thread.
    ///
    /// Task failures are caught and logged; this never panics because of a
    /// task.
    pub fn run(&mut self) {
        while let Some(task) = self.batch.pop_front() {
            self.report.run(&self.executor, task);
        }
    }

    /// Tasks not run yet.
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    /// Outcomes of the tasks run so far.
    pub fn report(&self) -> ExecutionReport {
        self.report
    }

    /// Name of the executor the job came from.
    pub(crate) fn executor(&self) -> &Arc<str> {
        &self.executor
    }

    fn into_parts(self) -> (Batch, ExecutionReport) {
        (self.batch, self.report)
    }
}

impl fmt::Debug for UiJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiJob")
            .field("executor", &self.executor)
            .field("remaining", &self.batch.len())
            .field("report", &self.report)
            .finish()
    }
}

/// A hand-off the UI thread refused, with the job returned untouched.
#[derive(Debug, thiserror::Error)]
#[error("{reason}")]
pub struct Rejected {
    pub job: UiJob,
    pub reason: HandoffError,
}

/// The UI toolkit's single event thread.
///
/// This is the seam between Courier and the widget toolkit. Implementations
/// must run the job on the event thread and block the caller until it has
/// returned, or give the job back with a reason when the thread cannot take
/// it (not started yet, shutting down).
///
/// [`EventThread`](crate::event_thread::EventThread) is a ready-made
/// implementation.
pub trait UiThread: Send + Sync + 'static {
    /// Runs `job` on the UI thread and waits for it.
    fn run_blocking(&self, job: UiJob) -> Result<UiJob, Rejected>;

    /// Returns `true` when called on the UI thread.
    ///
    /// [`UiExecutor::stop`] uses this to avoid waiting on the UI thread from
    /// the UI thread. The default, `false`, suits seams that cannot tell.
    fn is_current(&self) -> bool {
        false
    }
}

/// Execution step of the UI-affined consumer.
struct UiExecution {
    ui: Arc<dyn UiThread>,
    limit: usize,
    backoff: Duration,
}

impl Execute for UiExecution {
    fn execute(&mut self, shared: &Shared, batch: &mut Batch, report: &mut ExecutionReport) {
        let take = self.limit.min(batch.len());
        let mut job = UiJob::new(shared.name.clone(), batch.drain(..take).collect());

        loop {
            let sent = job.len();

            match self.ui.run_blocking(job) {
                Ok(done) => {
                    let (rest, done_report) = done.into_parts();
                    report.merge(done_report);

                    for task in rest.into_iter().rev() {
                        batch.push_front(task);
                    }
                    return;
                }
                Err(Rejected { job: back, reason }) => {
                    let (rest, done_report) = back.into_parts();
                    report.merge(done_report);

                    let lost = sent.saturating_sub(rest.len() + done_report.executed());
                    if lost > 0 {
                        shared.counters.discarded(lost);
                        tracing::warn!(
                            executor = %shared.name,
                            count = lost,
                            %reason,
                            "UI thread lost part of a batch"
                        );
                    }

                    if shared.pending.lifecycle().is_closed() {
                        let count = rest.len() + batch.len();
                        shared.counters.discarded(count);
                        batch.clear();

                        tracing::warn!(
                            executor = %shared.name,
                            count,
                            %reason,
                            "UI thread unavailable while stopping; dropping batch"
                        );
                        return;
                    }

                    if rest.is_empty() {
                        return;
                    }

                    tracing::debug!(
                        executor = %shared.name,
                        %reason,
                        backoff = ?self.backoff,
                        "UI thread rejected batch; retrying"
                    );
                    thread::sleep(self.backoff);

                    job = UiJob::new(shared.name.clone(), rest);
                }
            }
        }
    }
}

/// The UI-affined executor.
///
/// A single consumer thread (named `{prefix}-ui-handoff`) drains the queue
/// and hands each batch to the [`UiThread`], at most `batch_limit` tasks per
/// hand-off so the UI thread regularly returns to input and paint
/// processing. A rejected hand-off is retried with a fixed backoff until the
/// UI thread accepts it.
pub struct UiExecutor {
    consumer: Consumer,
    ui: Arc<dyn UiThread>,
}

impl UiExecutor {
    /// Starts the hand-off consumer.
    ///
    /// # Panics
    ///
    /// Panics if `batch_limit == 0`.
    pub fn start(
        prefix: &str,
        ui: Arc<dyn UiThread>,
        batch_limit: usize,
        backoff: Duration,
    ) -> Result<Self, BuildError> {
        assert!(batch_limit > 0, "ui_batch_limit must be > 0");

        let shared = Shared::new(format!("{prefix}-ui-handoff"));
        let strategy = UiExecution {
            ui: ui.clone(),
            limit: batch_limit,
            backoff,
        };

        Ok(Self {
            consumer: Consumer::spawn(shared, strategy)?,
            ui,
        })
    }

    /// Stops the consumer and waits for it to exit.
    ///
    /// With [`StopPolicy::Drain`] everything queued is still handed to the UI
    /// thread, so the UI thread must keep running until this returns.
    ///
    /// Called on the UI thread itself (a window-close handler, say), the
    /// queued tasks run inline instead and the hand-off thread is not
    /// waited for: a batch it already handed over runs once control returns
    /// to the event loop, and the thread exits after that.
    pub fn stop(&self, policy: StopPolicy) {
        if !self.ui.is_current() {
            self.consumer.stop(policy);
            return;
        }

        self.consumer.close(policy);

        let shared = self.consumer.shared();
        let mut batch = Batch::new();

        loop {
            shared.pending.swap_into(&mut batch);
            if batch.is_empty() {
                break;
            }

            shared.counters.iteration();

            let mut job = UiJob::new(shared.name.clone(), mem::take(&mut batch));
            job.run();
            shared.counters.record(&job.report());
        }

        self.consumer.detach();
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> ExecutorStats {
        self.consumer.stats()
    }
}

impl Submit for UiExecutor {
    fn submit_task(&self, task: Task) -> Result<(), SubmitError> {
        self.consumer.submit(task)
    }
}
