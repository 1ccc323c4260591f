use super::pending::{Batch, PendingSet};

use std::mem;
use std::sync::PoisonError;
use std::sync::atomic::Ordering;

/// Result of a blocking drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Drained {
    /// `batch` now holds at least one task.
    Batch,

    /// The executor is stopping and the queue is empty.
    Closed,
}

impl PendingSet {
    /// Blocks until tasks are available, then swaps all of them into `batch`.
    ///
    /// The emptiness check and the decision to park are made under the same
    /// lock that [`push`](PendingSet::push) takes to clear the wait flag, so a
    /// submission can never slip between them. After every wake-up the flag
    /// is checked again: only a producer (or [`close`](PendingSet::close))
    /// clearing it ends the wait, so spurious wake-ups go straight back to
    /// sleep.
    ///
    /// Queued tasks are still handed out after the executor started
    /// stopping; [`Drained::Closed`] is only returned once the queue is empty.
    pub(crate) fn next_batch(&self, batch: &mut Batch) -> Drained {
        let mut inner = self.lock();

        loop {
            if !inner.tasks.is_empty() {
                mem::swap(&mut inner.tasks, batch);
                return Drained::Batch;
            }

            if inner.lifecycle.is_closed() {
                return Drained::Closed;
            }

            inner.waiting = true;
            self.parks.fetch_add(1, Ordering::Relaxed);
            tracing::trace!("consumer parked");

            while inner.waiting {
                inner = self
                    .gate
                    .wait(inner)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }

    /// Number of times the consumer has parked.
    pub(crate) fn parks(&self) -> u64 {
        self.parks.load(Ordering::Relaxed)
    }
}
