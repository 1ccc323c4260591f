use crate::error::SubmitError;
use crate::executor::{Lifecycle, StopPolicy};
use crate::task::Task;

use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::AtomicU64;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Tasks moved out of a [`PendingSet`] in one drain.
///
/// A batch is owned by exactly one thread at a time and is never shared.
pub(crate) type Batch = VecDeque<Task>;

/// State guarded by the pending-set mutex.
pub(crate) struct Inner {
    /// Submitted tasks, oldest first.
    pub(super) tasks: VecDeque<Task>,

    /// `true` while the consumer is parked on an empty queue.
    pub(super) waiting: bool,

    /// Lifecycle of the owning executor.
    pub(super) lifecycle: Lifecycle,

    /// Set when the executor was stopped with [`StopPolicy::Discard`].
    pub(super) discard: bool,
}

/// Lock-protected queue of not-yet-run tasks.
///
/// Producers call [`push`](Self::push) from any thread. The single consumer
/// either swaps the whole queue out at once ([`swap_into`](Self::swap_into)
/// or the blocking [`next_batch`](Self::next_batch)) and puts back whatever
/// it did not run ([`requeue_front`](Self::requeue_front)).
pub(crate) struct PendingSet {
    pub(super) inner: Mutex<Inner>,

    /// Wakes the parked consumer. Always used with `inner`.
    pub(super) gate: Condvar,

    /// Number of times the consumer parked.
    pub(super) parks: AtomicU64,
}

impl PendingSet {
    /// Creates an empty set in the [`Lifecycle::New`] state.
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                tasks: VecDeque::new(),
                waiting: false,
                lifecycle: Lifecycle::New,
                discard: false,
            }),
            gate: Condvar::new(),
            parks: AtomicU64::new(0),
        }
    }

    /// Locks the inner state.
    ///
    /// Task bodies never run under this lock, so poisoning can only come from
    /// a bug in this module; the guard is recovered rather than propagated.
    pub(super) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a task and wakes the consumer if it is parked.
    ///
    /// The append, the flag check and the notification all happen inside
    /// one critical section.
    pub(crate) fn push(&self, task: Task) -> Result<(), SubmitError> {
        let mut inner = self.lock();

        if inner.lifecycle.is_closed() {
            return Err(SubmitError::Stopped);
        }

        inner.tasks.push_back(task);

        if inner.waiting {
            inner.waiting = false;
            self.gate.notify_one();
        }

        Ok(())
    }

    /// Moves every pending task into `batch` without waiting.
    ///
    /// `batch` is expected to be empty; whatever it held ends up back in the
    /// pending set.
    pub(crate) fn swap_into(&self, batch: &mut Batch) {
        let mut inner = self.lock();
        mem::swap(&mut inner.tasks, batch);
    }

    /// Puts an unexecuted remainder back at the front of the queue, ahead of
    /// anything submitted since it was drained.
    ///
    /// Returns the number of tasks requeued. After a discarding stop the
    /// remainder is dropped instead and `0` is returned.
    pub(crate) fn requeue_front(&self, mut remainder: Batch) -> usize {
        if remainder.is_empty() {
            return 0;
        }

        let mut inner = self.lock();

        if inner.discard {
            drop(inner);
            return 0;
        }

        let count = remainder.len();
        remainder.append(&mut inner.tasks);
        inner.tasks = remainder;

        count
    }

    /// Number of tasks currently queued.
    pub(crate) fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Returns `true` while the consumer is parked.
    pub(crate) fn is_parked(&self) -> bool {
        self.lock().waiting
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        self.lock().lifecycle
    }

    /// Marks the consumer as started.
    pub(crate) fn set_running(&self) {
        let mut inner = self.lock();

        if inner.lifecycle == Lifecycle::New {
            inner.lifecycle = Lifecycle::Running;
        }
    }

    /// Stops accepting submissions and wakes the consumer.
    ///
    /// With [`StopPolicy::Discard`] every queued task is dropped unrun and the
    /// number of dropped tasks is returned. Dropping happens after the lock is
    /// released.
    pub(crate) fn close(&self, policy: StopPolicy) -> usize {
        let mut inner = self.lock();

        if !inner.lifecycle.is_closed() {
            inner.lifecycle = Lifecycle::Stopping;
        }

        let dropped = match policy {
            StopPolicy::Drain => VecDeque::new(),
            StopPolicy::Discard => {
                inner.discard = true;
                mem::take(&mut inner.tasks)
            }
        };

        inner.waiting = false;
        self.gate.notify_all();
        drop(inner);

        dropped.len()
    }

    /// Marks the consumer as finished.
    pub(crate) fn mark_stopped(&self) {
        self.lock().lifecycle = Lifecycle::Stopped;
    }
}
