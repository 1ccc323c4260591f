use super::StopPolicy;
use super::report::ExecutionReport;
use crate::error::{BuildError, SubmitError};
use crate::queue::{Batch, Drained, PendingSet};
use crate::stats::{Counters, ExecutorStats};
use crate::task::{Task, panic_message};

use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

/// State shared between producers and the consumer of one instance.
pub(crate) struct Shared {
    /// Instance name; also the consumer thread's name.
    pub(crate) name: Arc<str>,

    pub(crate) pending: PendingSet,

    pub(crate) counters: Counters,
}

impl Shared {
    pub(crate) fn new(name: impl Into<Arc<str>>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            pending: PendingSet::new(),
            counters: Counters::default(),
        })
    }

    pub(crate) fn submit(&self, task: Task) -> Result<(), SubmitError> {
        match self.pending.push(task) {
            Ok(()) => {
                self.counters.submitted();
                Ok(())
            }
            Err(e) => {
                self.counters.rejected();
                Err(e)
            }
        }
    }

    /// Stops accepting submissions and wakes the consumer.
    pub(crate) fn close(&self, policy: StopPolicy) {
        let dropped = self.pending.close(policy);

        if dropped > 0 {
            self.counters.discarded(dropped);
            tracing::warn!(executor = %self.name, count = dropped, "discarded queued tasks on stop");
        }
    }

    pub(crate) fn stats(&self) -> ExecutorStats {
        self.counters.snapshot(
            &self.name,
            self.pending.lifecycle(),
            self.pending.is_parked(),
            self.pending.len(),
            self.pending.parks(),
        )
    }
}

/// Variant-specific execution step of the consumer loop.
pub(crate) trait Execute: Send + 'static {
    /// Runs as much of `batch` as this variant allows in one iteration,
    /// recording every finished task in `report`.
    ///
    /// Tasks still in `batch` when this returns are carried over to the
    /// front of the pending set.
    fn execute(&mut self, shared: &Shared, batch: &mut Batch, report: &mut ExecutionReport);
}

/// The drain → park-if-empty → execute → reconcile cycle.
struct ConsumerLoop<E> {
    shared: Arc<Shared>,
    strategy: E,
}

impl<E: Execute> ConsumerLoop<E> {
    /// Runs until the instance is stopped and its queue is empty.
    fn run(self) {
        let ConsumerLoop {
            shared,
            mut strategy,
        } = self;

        shared.pending.set_running();
        tracing::debug!(executor = %shared.name, "consumer started");

        let mut batch = Batch::new();

        loop {
            let mut report = ExecutionReport::default();

            if shared.pending.next_batch(&mut batch) == Drained::Closed {
                break;
            }

            shared.counters.iteration();

            let taken = batch.len();
            let executed = panic::catch_unwind(AssertUnwindSafe(|| {
                strategy.execute(&shared, &mut batch, &mut report)
            }));
            shared.counters.record(&report);

            if let Err(payload) = executed {
                // Tasks in flight when the step unwound are gone.
                let lost = taken.saturating_sub(batch.len() + report.executed());
                shared.counters.discarded(lost);
                tracing::error!(
                    executor = %shared.name,
                    count = lost,
                    error = %panic_message(payload.as_ref()),
                    "execution step panicked; continuing"
                );
            }

            if batch.is_empty() {
                continue;
            }

            // Reconcile. The batch was swapped out whole, so nothing it ran
            // can still be pending; only the unexecuted remainder goes back.
            let remainder = batch.len();
            let requeued = shared.pending.requeue_front(mem::take(&mut batch));

            shared.counters.carried_over(requeued);
            if requeued < remainder {
                shared.counters.discarded(remainder - requeued);
                tracing::warn!(
                    executor = %shared.name,
                    count = remainder - requeued,
                    "discarded unexecuted batch remainder on stop"
                );
            } else {
                tracing::trace!(executor = %shared.name, count = requeued, "carried over batch remainder");
            }
        }

        shared.pending.mark_stopped();
        tracing::debug!(executor = %shared.name, "consumer stopped");
    }
}

/// An executor instance backed by its own consumer thread.
pub(crate) struct Consumer {
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Consumer {
    /// Spawns the consumer thread, named after the instance.
    pub(crate) fn spawn<E: Execute>(shared: Arc<Shared>, strategy: E) -> Result<Self, BuildError> {
        let name = shared.name.to_string();

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn({
                let shared = shared.clone();
                move || ConsumerLoop { shared, strategy }.run()
            })
            .map_err(|source| BuildError::Spawn { name, source })?;

        Ok(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub(crate) fn shared(&self) -> &Shared {
        &self.shared
    }

    pub(crate) fn submit(&self, task: Task) -> Result<(), SubmitError> {
        self.shared.submit(task)
    }

    pub(crate) fn close(&self, policy: StopPolicy) {
        self.shared.close(policy);
    }

    /// Waits for the consumer thread to exit.
    ///
    /// Does nothing if already joined. Called from the consumer thread itself
    /// (a task stopping its own executor) the thread is detached instead: it
    /// exits on its own once its queue is empty.
    pub(crate) fn join(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(handle) = handle else {
            return;
        };

        if handle.thread().id() == thread::current().id() {
            tracing::warn!(executor = %self.shared.name, "executor stopped from its own thread; not joining");
            return;
        }

        if handle.join().is_err() {
            tracing::error!(executor = %self.shared.name, "consumer thread panicked");
        }
    }

    pub(crate) fn stop(&self, policy: StopPolicy) {
        self.close(policy);
        self.join();
    }

    /// Lets the consumer thread run to completion without ever joining it.
    pub(crate) fn detach(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if handle.is_some() {
            tracing::debug!(executor = %self.shared.name, "consumer detached; it exits once its queue is empty");
        }
    }

    pub(crate) fn stats(&self) -> ExecutorStats {
        self.shared.stats()
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.stop(StopPolicy::Drain);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Lifecycle;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    /// Runs at most `limit` tasks per iteration.
    struct Capped {
        limit: usize,
        sizes: mpsc::Sender<usize>,
    }

    impl Execute for Capped {
        fn execute(&mut self, shared: &Shared, batch: &mut Batch, report: &mut ExecutionReport) {
            let _ = self.sizes.send(batch.len());

            for _ in 0..self.limit {
                match batch.pop_front() {
                    Some(task) => report.run(&shared.name, task),
                    None => break,
                }
            }
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_remainder_is_carried_over_in_order() {
        let (sizes, _rx) = mpsc::channel();
        let shared = Shared::new("test-capped");
        let order = Arc::new(Mutex::new(Vec::new()));

        // Queue everything before the consumer starts so the first batch is
        // deterministic.
        for i in 0..10 {
            let order = order.clone();
            shared
                .submit(Task::new(move || order.lock().unwrap().push(i)))
                .unwrap();
        }

        let consumer = Consumer::spawn(shared.clone(), Capped { limit: 3, sizes }).unwrap();
        wait_until(|| order.lock().unwrap().len() == 10);

        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());

        let stats = consumer.stats();
        assert_eq!(stats.iterations, 4);
        assert_eq!(stats.carried_over, 7 + 4 + 1);
    }

    #[test]
    fn test_stop_drains_then_joins() {
        let (sizes, _rx) = mpsc::channel();
        let shared = Shared::new("test-drain");
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..20 {
            let ran = ran.clone();
            shared
                .submit(Task::new(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        let consumer = Consumer::spawn(shared.clone(), Capped { limit: 5, sizes }).unwrap();
        consumer.stop(StopPolicy::Drain);

        assert_eq!(ran.load(Ordering::SeqCst), 20);
        assert_eq!(shared.pending.lifecycle(), Lifecycle::Stopped);
        assert_eq!(shared.submit(Task::new(|| {})), Err(SubmitError::Stopped));
        assert_eq!(consumer.stats().rejected, 1);
    }

    #[test]
    fn test_failing_task_is_recorded() {
        let (sizes, _rx) = mpsc::channel();
        let shared = Shared::new("test-failure");

        shared.submit(Task::new(|| panic!("broken importer"))).unwrap();
        shared.submit(Task::new(|| {})).unwrap();

        let consumer = Consumer::spawn(shared, Capped { limit: 8, sizes }).unwrap();
        wait_until(|| consumer.stats().executed() == 2);

        let stats = consumer.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 1);
    }

    /// Takes the first task of the first batch and panics while holding it.
    struct Unwinding {
        panicked: bool,
    }

    impl Execute for Unwinding {
        fn execute(&mut self, shared: &Shared, batch: &mut Batch, report: &mut ExecutionReport) {
            if !self.panicked {
                self.panicked = true;
                let _in_flight = batch.pop_front();
                panic!("execution step failed");
            }

            while let Some(task) = batch.pop_front() {
                report.run(&shared.name, task);
            }
        }
    }

    #[test]
    fn test_panicking_step_keeps_consumer_alive() {
        let shared = Shared::new("test-unwinding");
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let ran = ran.clone();
            shared
                .submit(Task::new(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
        }

        let consumer = Consumer::spawn(shared.clone(), Unwinding { panicked: false }).unwrap();
        wait_until(|| ran.load(Ordering::SeqCst) == 2);

        let late = ran.clone();
        shared
            .submit(Task::new(move || {
                late.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        wait_until(|| ran.load(Ordering::SeqCst) == 3);

        let stats = consumer.stats();
        assert_eq!(stats.lifecycle, Lifecycle::Running);
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.carried_over, 2);
        assert_eq!(stats.completed, 3);
    }
}
