use super::Dispatcher;
use crate::error::BuildError;
use crate::executor::ui::{DEFAULT_BATCH_LIMIT, DEFAULT_RETRY_BACKOFF};
use crate::executor::{BackgroundPool, BatchPolicy, EngineQueue, StopPolicy, UiExecutor, UiThread};

use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Builder for configuring and creating a [`Dispatcher`].
///
/// # Examples
///
/// ```rust,ignore
/// let ui = Arc::new(EventThread::spawn("editor-ui")?);
///
/// let dispatcher = DispatcherBuilder::new()
///     .background_threads(4)
///     .background_policy(BatchPolicy::spread())
///     .ui_batch_limit(128)
///     .build(ui)?;
/// ```
#[derive(Debug, Clone)]
pub struct DispatcherBuilder {
    /// Number of background workers.
    background_threads: usize,

    background_policy: BatchPolicy,

    /// Maximum tasks per hand-off to the UI thread.
    ui_batch_limit: usize,

    /// Pause before retrying a rejected UI hand-off.
    ui_retry_backoff: Duration,

    /// Prefix of every thread and executor name.
    thread_name_prefix: String,
}

impl DispatcherBuilder {
    /// Creates a builder with default configuration.
    ///
    /// By default, the number of background workers is the number of
    /// available logical CPUs, falling back to `1` if unavailable.
    pub fn new() -> Self {
        let background_threads = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            background_threads,
            background_policy: BatchPolicy::default(),
            ui_batch_limit: DEFAULT_BATCH_LIMIT,
            ui_retry_backoff: DEFAULT_RETRY_BACKOFF,
            thread_name_prefix: "courier".to_string(),
        }
    }

    /// Sets the number of background workers.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn background_threads(mut self, n: usize) -> Self {
        assert!(n > 0, "background_threads must be > 0");

        self.background_threads = n;
        self
    }

    /// Sets how much of each drained batch a background worker runs before
    /// draining again.
    pub fn background_policy(mut self, policy: BatchPolicy) -> Self {
        self.background_policy = policy;
        self
    }

    /// Sets the maximum number of tasks handed to the UI thread at once.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn ui_batch_limit(mut self, n: usize) -> Self {
        assert!(n > 0, "ui_batch_limit must be > 0");

        self.ui_batch_limit = n;
        self
    }

    /// Sets the fixed pause between attempts when the UI thread rejects a
    /// hand-off.
    pub fn ui_retry_backoff(mut self, backoff: Duration) -> Self {
        self.ui_retry_backoff = backoff;
        self
    }

    /// Sets the prefix of instance names.
    ///
    /// Consumer threads are named `{prefix}-bg-{i}` and
    /// `{prefix}-ui-handoff`. The engine queue has no thread; its instance
    /// name, used in logs and statistics, is `{prefix}-engine`.
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Starts every executor.
    ///
    /// `ui` is the UI toolkit's event thread; it does not need to be running
    /// yet, hand-offs are retried until it is.
    pub fn build(self, ui: Arc<dyn UiThread>) -> Result<Dispatcher, BuildError> {
        let prefix = &self.thread_name_prefix;

        let background =
            BackgroundPool::start(prefix, self.background_threads, self.background_policy)?;

        let ui = match UiExecutor::start(prefix, ui, self.ui_batch_limit, self.ui_retry_backoff) {
            Ok(ui) => ui,
            Err(e) => {
                background.stop(StopPolicy::Discard);
                return Err(e);
            }
        };

        let engine = EngineQueue::new(&format!("{prefix}-engine"));

        tracing::info!(
            background_threads = self.background_threads,
            policy = ?self.background_policy,
            ui_batch_limit = self.ui_batch_limit,
            "dispatcher started"
        );

        Ok(Dispatcher::new(background, ui, engine))
    }
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
