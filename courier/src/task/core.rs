use super::CancelHandle;
use crate::error::{BoxError, TaskFailure};

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Source of process-unique task identifiers.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

type Body = Box<dyn FnOnce() -> Result<(), BoxError> + Send + 'static>;

/// Identifier attached to every task, used in log records.
///
/// Identifiers are unique for the lifetime of the process and increase
/// monotonically in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    fn next() -> Self {
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of running one task body.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// The body returned normally.
    Completed,

    /// The task was cancelled before its body started.
    Skipped,

    /// The body panicked or returned an error.
    Failed(TaskFailure),
}

/// An opaque unit of work.
///
/// Tasks are built from closures and handed to an executor through
/// [`Submit`](crate::Submit) or the [`Dispatcher`](crate::Dispatcher). Once
/// submitted, a task either runs exactly once or is dropped unrun when its
/// executor stops with [`StopPolicy::Discard`](crate::StopPolicy::Discard).
///
/// # Examples
///
/// ```rust,ignore
/// let task = Task::new(|| println!("hello from a worker"));
/// dispatcher.submit_background_task(task)?;
/// ```
pub struct Task {
    id: TaskId,
    body: Body,
    cancelled: Option<Arc<AtomicBool>>,
}

impl Task {
    /// Wraps an infallible closure.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self::from_body(Box::new(move || {
            f();
            Ok(())
        }))
    }

    /// Wraps a closure that may return an error.
    ///
    /// An `Err` is handled exactly like a panic: it is logged and the task is
    /// counted as failed. It is never retried.
    pub fn fallible<F, E>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), E> + Send + 'static,
        E: Into<BoxError>,
    {
        Self::from_body(Box::new(move || f().map_err(Into::into)))
    }

    /// Wraps a closure together with a handle that can cancel it before it
    /// starts.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let (task, handle) = Task::cancellable(|| rebuild_thumbnails());
    /// dispatcher.submit_background_task(task)?;
    ///
    /// // The user closed the asset browser before the rebuild started.
    /// handle.cancel();
    /// ```
    pub fn cancellable<F>(f: F) -> (Self, CancelHandle)
    where
        F: FnOnce() + Send + 'static,
    {
        let flag = Arc::new(AtomicBool::new(false));
        let mut task = Self::new(f);
        task.cancelled = Some(flag.clone());

        (task, CancelHandle::new(flag))
    }

    fn from_body(body: Body) -> Self {
        Self {
            id: TaskId::next(),
            body,
            cancelled: None,
        }
    }

    /// Returns this task's identifier.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Runs the task on the current thread, catching any panic.
    pub(crate) fn run(self) -> Outcome {
        let Task {
            body, cancelled, ..
        } = self;

        if cancelled.is_some_and(|flag| flag.load(Ordering::Acquire)) {
            return Outcome::Skipped;
        }

        match panic::catch_unwind(AssertUnwindSafe(body)) {
            Ok(Ok(())) => Outcome::Completed,
            Ok(Err(error)) => Outcome::Failed(TaskFailure::Failed(error)),
            Err(payload) => Outcome::Failed(TaskFailure::Panicked(panic_message(payload.as_ref()))),
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("cancellable", &self.cancelled.is_some())
            .finish_non_exhaustive()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
