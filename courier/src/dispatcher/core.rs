use super::DispatcherBuilder;
use crate::error::SubmitError;
use crate::executor::{BackgroundPool, EngineQueue, StopPolicy, Submit, UiExecutor};
use crate::stats::DispatcherStats;
use crate::task::Task;

use std::sync::{Mutex, PoisonError};

/// The editor's task dispatcher.
///
/// `Dispatcher` is responsible for:
/// - routing background submissions across the worker pool,
/// - routing UI submissions to the UI-affined executor,
/// - queueing engine submissions until the render loop drains them,
/// - stopping everything in order.
///
/// All `submit_*` methods may be called from any thread and return
/// immediately. Dropping the dispatcher stops it with
/// [`StopPolicy::Drain`].
pub struct Dispatcher {
    background: BackgroundPool,
    ui: UiExecutor,
    engine: EngineQueue,

    /// Serializes [`stop`](Self::stop); `true` once it has run.
    stopped: Mutex<bool>,
}

impl Dispatcher {
    pub(crate) fn new(background: BackgroundPool, ui: UiExecutor, engine: EngineQueue) -> Self {
        Self {
            background,
            ui,
            engine,
            stopped: Mutex::new(false),
        }
    }

    /// Returns a builder with default configuration.
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Queues a closure on one of the background workers.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// dispatcher.submit_background(move || index.rescan(&root))?;
    /// ```
    pub fn submit_background<F>(&self, f: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.background.submit(f)
    }

    /// Queues a prebuilt [`Task`] on one of the background workers.
    pub fn submit_background_task(&self, task: Task) -> Result<(), SubmitError> {
        self.background.submit_task(task)
    }

    /// Queues a closure to run on the UI thread.
    pub fn submit_ui<F>(&self, f: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.ui.submit(f)
    }

    /// Queues a prebuilt [`Task`] to run on the UI thread.
    pub fn submit_ui_task(&self, task: Task) -> Result<(), SubmitError> {
        self.ui.submit_task(task)
    }

    /// Queues a closure to run on the render thread at the next frame.
    pub fn submit_engine<F>(&self, f: F) -> Result<(), SubmitError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.engine.submit(f)
    }

    /// Queues a prebuilt [`Task`] to run on the render thread at the next
    /// frame.
    pub fn submit_engine_task(&self, task: Task) -> Result<(), SubmitError> {
        self.engine.submit_task(task)
    }

    /// The background worker pool.
    pub fn background(&self) -> &BackgroundPool {
        &self.background
    }

    /// The UI-affined executor.
    pub fn ui(&self) -> &UiExecutor {
        &self.ui
    }

    /// The engine queue, drained by the render loop.
    pub fn engine(&self) -> &EngineQueue {
        &self.engine
    }

    /// Statistics snapshot of every executor.
    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            background: self.background.stats(),
            ui: self.ui.stats(),
            engine: self.engine.stats(),
        }
    }

    /// Returns `true` once [`stop`](Self::stop) has begun.
    pub fn is_stopped(&self) -> bool {
        self.background.is_closed()
    }

    /// Stops every executor and waits for the consumer threads.
    ///
    /// Executors are stopped downstream-last: the background pool first, then
    /// the UI executor, then the engine queue, so work that background tasks
    /// forward to the UI or the engine while draining is still accepted.
    /// Remaining engine tasks run on the calling thread.
    ///
    /// May be called on the UI thread, e.g. from a window-close handler;
    /// remaining UI tasks then run inline on it. Idempotent. Must not be
    /// called from inside a task.
    pub fn stop(&self, policy: StopPolicy) {
        let mut stopped = self
            .stopped
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if *stopped {
            return;
        }
        *stopped = true;

        tracing::info!(?policy, "stopping dispatcher");

        self.background.stop(policy);

        self.ui.stop(policy);

        self.engine.stop(policy);

        tracing::info!("dispatcher stopped");
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop(StopPolicy::Drain);
    }
}
