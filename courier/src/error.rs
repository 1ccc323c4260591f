//! Error types.
//!
//! Nothing in this module is ever returned *from a task*: task failures are
//! caught by the executor, logged, and counted. The errors here describe the
//! boundaries around the queues (submission, the UI hand-off, and startup).

use std::error::Error;
use std::io;

use thiserror::Error;

/// Boxed error produced by a fallible task body.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Returned by `submit` once the target executor has begun stopping.
///
/// The rejected task is dropped without running.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    #[error("executor is stopped and no longer accepts tasks")]
    Stopped,
}

/// Reason a [`UiThread`](crate::UiThread) refused to run a job.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HandoffError {
    /// The toolkit event thread has not been started yet.
    #[error("UI thread is not running yet")]
    NotReady,

    /// The toolkit event thread is shutting down or already gone.
    #[error("UI thread is shutting down")]
    ShuttingDown,
}

/// Failure while assembling a dispatcher or one of its executors.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to spawn thread `{name}`")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// How a single task failed.
///
/// Only ever observed in log records and statistics.
#[derive(Debug, Error)]
pub enum TaskFailure {
    #[error("task panicked: {0}")]
    Panicked(String),

    #[error("task returned an error: {0}")]
    Failed(#[source] BoxError),
}
