use super::consumer::{Consumer, Execute, Shared};
use super::report::ExecutionReport;
use super::{StopPolicy, Submit};
use crate::error::{BuildError, SubmitError};
use crate::queue::Batch;
use crate::stats::ExecutorStats;
use crate::task::Task;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Per-iteration execution limit of a background worker.
///
/// A worker drains its whole queue at the start of every iteration. The
/// policy decides how much of that batch is run before the worker drains
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    /// Run the whole batch every iteration.
    #[default]
    Unbounded,

    /// Run at most `ceil(batch / workers)` tasks per iteration, `group` tasks
    /// at a time with a yield between groups.
    ///
    /// Tasks past the limit are carried over to the front of the worker's
    /// queue and run in the next iteration, before anything submitted later.
    /// Nothing is ever dropped.
    Spread { group: usize },
}

impl BatchPolicy {
    /// Sub-group size used by [`BatchPolicy::spread`].
    pub const DEFAULT_GROUP: usize = 8;

    /// [`BatchPolicy::Spread`] with the default sub-group size.
    pub const fn spread() -> Self {
        BatchPolicy::Spread {
            group: Self::DEFAULT_GROUP,
        }
    }
}

/// Execution step of one background worker.
struct BackgroundExecution {
    workers: usize,
    policy: BatchPolicy,
}

impl Execute for BackgroundExecution {
    fn execute(&mut self, shared: &Shared, batch: &mut Batch, report: &mut ExecutionReport) {
        match self.policy {
            BatchPolicy::Unbounded => {
                while let Some(task) = batch.pop_front() {
                    report.run(&shared.name, task);
                }
            }
            BatchPolicy::Spread { group } => {
                let cap = batch.len().div_ceil(self.workers);
                let group = group.max(1);
                let mut ran = 0;

                while ran < cap {
                    for task in batch.drain(..group.min(cap - ran)) {
                        report.run(&shared.name, task);
                        ran += 1;
                    }

                    if ran < cap {
                        thread::yield_now();
                    }
                }
            }
        }
    }
}

/// A fixed pool of independent single-threaded background workers.
///
/// Each worker owns its own queue and runs its tasks one at a time; up to
/// [`len`](Self::len) tasks run in parallel across the pool. There is no
/// shared queue and no work stealing: [`submit_task`](Submit::submit_task)
/// picks a worker round-robin, [`submit_to`](Self::submit_to) targets one
/// explicitly.
///
/// Workers are named `{prefix}-bg-{index}`.
pub struct BackgroundPool {
    workers: Vec<Consumer>,

    /// Round-robin cursor.
    next: AtomicUsize,
}

impl BackgroundPool {
    /// Starts `threads` workers.
    ///
    /// If a worker thread cannot be spawned, the workers already started are
    /// stopped again before the error is returned.
    ///
    /// # Panics
    ///
    /// Panics if `threads == 0`.
    pub fn start(prefix: &str, threads: usize, policy: BatchPolicy) -> Result<Self, BuildError> {
        assert!(threads > 0, "background_threads must be > 0");

        let mut workers = Vec::with_capacity(threads);

        for index in 0..threads {
            let shared = Shared::new(format!("{prefix}-bg-{index}"));
            let strategy = BackgroundExecution {
                workers: threads,
                policy,
            };

            // Workers already in the vec are stopped when it drops.
            workers.push(Consumer::spawn(shared, strategy)?);
        }

        tracing::debug!(threads, ?policy, "background pool started");

        Ok(Self {
            workers,
            next: AtomicUsize::new(0),
        })
    }

    /// Number of workers.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Returns `true` if the pool has no workers, which [`start`](Self::start)
    /// never produces.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Queues a task on worker `index % len()`.
    ///
    /// Tasks sent to the same worker never run concurrently with each other.
    pub fn submit_to(&self, index: usize, task: Task) -> Result<(), SubmitError> {
        self.workers[index % self.workers.len()].submit(task)
    }

    /// Stops every worker and waits for their threads to exit.
    ///
    /// All workers are closed first, then joined.
    pub fn stop(&self, policy: StopPolicy) {
        for worker in &self.workers {
            worker.close(policy);
        }

        for worker in &self.workers {
            worker.join();
        }
    }

    /// Per-worker statistics, in worker order.
    pub fn stats(&self) -> Vec<ExecutorStats> {
        self.workers.iter().map(Consumer::stats).collect()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.workers
            .iter()
            .all(|w| w.shared().pending.lifecycle().is_closed())
    }
}

impl Submit for BackgroundPool {
    fn submit_task(&self, task: Task) -> Result<(), SubmitError> {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        self.submit_to(index, task)
    }
}
