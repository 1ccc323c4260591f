//! A stand-alone UI event thread.
//!
//! [`EventThread`] owns one named OS thread that processes messages in
//! order: batches handed over by the UI-affined executor, and standalone
//! callbacks posted with [`EventThread::post`] (playing the role of input and
//! paint events of a real toolkit). It implements [`UiThread`], so it can be
//! plugged into a [`Dispatcher`](crate::Dispatcher) wherever the real widget
//! toolkit is not available, e.g. headless tools and tests.
//!
//! The thread goes through three states: created but not started (hand-offs
//! are rejected with [`HandoffError::NotReady`]), running, and shut down
//! (rejected with [`HandoffError::ShuttingDown`]).

use crate::error::{BuildError, HandoffError};
use crate::executor::{Rejected, UiJob, UiThread};
use crate::queue::Batch;

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

type Callback = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    /// Run a job and send it back.
    Run(UiJob, Sender<UiJob>),

    /// Run a fire-and-forget callback.
    Post(Callback),

    /// Exit the loop. Always the last message sent.
    Shutdown,
}

enum State {
    Idle,
    Running {
        sender: Sender<Message>,
        thread: ThreadId,
        handle: JoinHandle<()>,
    },
    Closed,
}

/// A dedicated thread acting as the UI toolkit's event thread.
///
/// # Examples
///
/// ```rust,ignore
/// let ui = Arc::new(EventThread::spawn("editor-ui")?);
/// let dispatcher = Dispatcher::builder().build(ui.clone())?;
///
/// dispatcher.submit_ui(|| outline.refresh())?;
/// ```
pub struct EventThread {
    name: String,
    state: Mutex<State>,
}

impl EventThread {
    /// Creates the event thread without starting it.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(State::Idle),
        }
    }

    /// Creates and starts the event thread.
    pub fn spawn(name: impl Into<String>) -> Result<Self, BuildError> {
        let event_thread = Self::new(name);
        event_thread.start()?;
        Ok(event_thread)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts the thread. Does nothing if it is already running or was shut
    /// down.
    pub fn start(&self) -> Result<(), BuildError> {
        let mut state = self.lock();

        if !matches!(*state, State::Idle) {
            return Ok(());
        }

        let (sender, receiver) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || event_loop(receiver))
            .map_err(|source| BuildError::Spawn {
                name: self.name.clone(),
                source,
            })?;

        tracing::debug!(thread = %self.name, "event thread started");

        *state = State::Running {
            sender,
            thread: handle.thread().id(),
            handle,
        };

        Ok(())
    }

    /// Identity of the event thread, once started.
    pub fn thread_id(&self) -> Option<ThreadId> {
        match &*self.lock() {
            State::Running { thread, .. } => Some(*thread),
            State::Idle | State::Closed => None,
        }
    }

    /// Returns `true` when called from the event thread itself.
    pub fn is_current(&self) -> bool {
        self.thread_id() == Some(thread::current().id())
    }

    /// Queues a callback on the event thread without waiting for it.
    pub fn post<F>(&self, f: F) -> Result<(), HandoffError>
    where
        F: FnOnce() + Send + 'static,
    {
        match &*self.lock() {
            State::Running { sender, .. } => sender
                .send(Message::Post(Box::new(f)))
                .map_err(|_| HandoffError::ShuttingDown),
            State::Idle => Err(HandoffError::NotReady),
            State::Closed => Err(HandoffError::ShuttingDown),
        }
    }

    /// Processes every message already queued, then stops the thread and
    /// waits for it.
    ///
    /// Must not be called from the event thread itself.
    pub fn shutdown(&self) {
        let previous = std::mem::replace(&mut *self.lock(), State::Closed);

        let State::Running { sender, handle, .. } = previous else {
            return;
        };

        // Every send happens under the state lock, which now reads Closed:
        // nothing can be queued behind this.
        let _ = sender.send(Message::Shutdown);
        drop(sender);

        if handle.thread().id() == thread::current().id() {
            tracing::warn!(thread = %self.name, "event thread shut down from itself; not joining");
            return;
        }

        if handle.join().is_err() {
            tracing::error!(thread = %self.name, "event thread panicked");
        }

        tracing::debug!(thread = %self.name, "event thread stopped");
    }
}

impl UiThread for EventThread {
    fn run_blocking(&self, mut job: UiJob) -> Result<UiJob, Rejected> {
        let (reply, done) = mpsc::channel();
        let executor = job.executor().clone();
        let count = job.len();

        {
            let state = self.lock();

            let State::Running {
                sender,
                thread: ui_thread,
                ..
            } = &*state
            else {
                let reason = match *state {
                    State::Idle => HandoffError::NotReady,
                    _ => HandoffError::ShuttingDown,
                };
                return Err(Rejected { job, reason });
            };

            // Already on the event thread: waiting for ourselves would
            // deadlock.
            if *ui_thread == thread::current().id() {
                drop(state);
                job.run();
                return Ok(job);
            }

            if let Err(mpsc::SendError(message)) = sender.send(Message::Run(job, reply)) {
                let Message::Run(job, _) = message else {
                    unreachable!("sent a Run message");
                };
                return Err(Rejected {
                    job,
                    reason: HandoffError::ShuttingDown,
                });
            }
        }

        done.recv().map_err(|_| {
            tracing::error!(thread = %self.name, count, "event thread exited without returning the job");
            Rejected {
                job: UiJob::new(executor, Batch::new()),
                reason: HandoffError::ShuttingDown,
            }
        })
    }

    fn is_current(&self) -> bool {
        EventThread::is_current(self)
    }
}

impl Drop for EventThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn event_loop(receiver: Receiver<Message>) {
    for message in receiver {
        match message {
            Message::Run(mut job, reply) => {
                job.run();
                let _ = reply.send(job);
            }
            Message::Post(callback) => {
                if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
                    tracing::warn!("posted UI callback panicked");
                }
            }
            Message::Shutdown => break,
        }
    }
}
