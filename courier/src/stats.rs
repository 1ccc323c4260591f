//! Execution statistics.
//!
//! Every executor instance keeps a set of relaxed atomic counters. A
//! snapshot is a plain value; the counters inside it are individually exact
//! but are not read as one atomic unit.

use crate::executor::{ExecutionReport, Lifecycle};

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    discarded: AtomicU64,
    iterations: AtomicU64,
    carried_over: AtomicU64,
}

fn bump(counter: &AtomicU64, n: usize) {
    if n > 0 {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

impl Counters {
    pub(crate) fn submitted(&self) {
        bump(&self.submitted, 1);
    }

    pub(crate) fn rejected(&self) {
        bump(&self.rejected, 1);
    }

    pub(crate) fn iteration(&self) {
        bump(&self.iterations, 1);
    }

    pub(crate) fn carried_over(&self, n: usize) {
        bump(&self.carried_over, n);
    }

    pub(crate) fn discarded(&self, n: usize) {
        bump(&self.discarded, n);
    }

    pub(crate) fn record(&self, report: &ExecutionReport) {
        bump(&self.completed, report.completed);
        bump(&self.failed, report.failed);
        bump(&self.skipped, report.skipped);
    }

    pub(crate) fn snapshot(
        &self,
        name: &str,
        lifecycle: Lifecycle,
        parked: bool,
        pending: usize,
        parks: u64,
    ) -> ExecutorStats {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);

        ExecutorStats {
            name: name.to_string(),
            lifecycle,
            parked,
            pending,
            submitted: load(&self.submitted),
            rejected: load(&self.rejected),
            completed: load(&self.completed),
            failed: load(&self.failed),
            skipped: load(&self.skipped),
            discarded: load(&self.discarded),
            iterations: load(&self.iterations),
            parks,
            carried_over: load(&self.carried_over),
        }
    }
}

/// Snapshot of one executor instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorStats {
    /// Instance name, also used as its thread name.
    pub name: String,
    pub lifecycle: Lifecycle,

    /// `true` while the consumer is parked on an empty queue.
    pub parked: bool,

    /// Tasks queued right now.
    pub pending: usize,

    pub submitted: u64,

    /// Submissions refused because the instance was stopping.
    pub rejected: u64,

    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,

    /// Tasks dropped unrun by a discarding stop.
    pub discarded: u64,

    /// Consumer iterations that drained a non-empty batch.
    pub iterations: u64,

    pub parks: u64,

    /// Tasks put back at the front of the queue because a capped iteration
    /// did not reach them.
    pub carried_over: u64,
}

impl ExecutorStats {
    /// Tasks finished with any outcome.
    pub fn executed(&self) -> u64 {
        self.completed + self.failed + self.skipped
    }
}

/// Snapshot of every executor owned by a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherStats {
    pub background: Vec<ExecutorStats>,
    pub ui: ExecutorStats,
    pub engine: ExecutorStats,
}

impl DispatcherStats {
    /// Tasks finished across all executors.
    pub fn executed(&self) -> u64 {
        self.background
            .iter()
            .chain([&self.ui, &self.engine])
            .map(ExecutorStats::executed)
            .sum()
    }
}
