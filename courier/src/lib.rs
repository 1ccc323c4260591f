//! # Courier
//!
//! **Courier** is the cross-thread task dispatch layer of the editor. It lets
//! any thread hand a unit of work to exactly one of a fixed set of
//! single-consumer execution contexts:
//!
//! - a pool of **background workers**, one per available core, each running
//!   its own tasks one at a time,
//! - the **UI event thread**, through a hand-off consumer that runs each
//!   batch synchronously on the toolkit's thread,
//! - the **render thread**, which pulls queued work once per frame.
//!
//! Every executor instance owns a private queue guarded by one mutex, and its
//! consumer parks on a condition variable sharing that mutex when the queue
//! is empty, so no submission can be missed. Tasks are fire-and-forget: a
//! task that panics or returns an error is logged and counted, never retried,
//! and never stops the executor.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::event_thread::EventThread;
//! use courier::{Dispatcher, StopPolicy};
//! use std::sync::Arc;
//!
//! let ui = Arc::new(EventThread::spawn("editor-ui")?);
//! let dispatcher = Dispatcher::builder().build(ui.clone())?;
//!
//! dispatcher.submit_background(|| {
//!     // decode a texture, index an asset folder, ...
//! })?;
//! dispatcher.submit_ui(|| {
//!     // update a widget
//! })?;
//! dispatcher.submit_engine(|| {
//!     // mutate the scene graph
//! })?;
//!
//! // Once per frame, on the render thread:
//! dispatcher.engine().drain_frame();
//!
//! dispatcher.stop(StopPolicy::Drain);
//! ```
//!
//! ## Modules
//!
//! - [`task`] — Tasks, task ids and cancellation handles
//! - [`event_thread`] — A stand-alone UI event thread
//! - [`error`] — Submission, hand-off and startup errors

mod dispatcher;
mod executor;
mod queue;
mod stats;

pub mod error;
pub mod event_thread;
pub mod task;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use executor::{
    BackgroundPool, BatchPolicy, EngineQueue, ExecutionReport, Lifecycle, Rejected, StopPolicy,
    Submit, UiExecutor, UiJob, UiThread,
};
pub use stats::{DispatcherStats, ExecutorStats};
pub use task::{CancelHandle, Task, TaskId};
