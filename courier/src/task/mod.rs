//! Task primitives.
//!
//! A [`Task`] is an opaque, zero-argument unit of work. It runs at most once,
//! on whichever executor it was submitted to, and produces no observable
//! result. Tasks may fail: a panic or an `Err` from a fallible body is caught
//! by the executor and never reaches the caller.
//!
//! This module also provides [`CancelHandle`], the entry-check cancellation
//! wrapper returned by [`Task::cancellable`].

mod cancel;
mod core;

pub(crate) use self::core::{Outcome, panic_message};

pub use cancel::CancelHandle;
pub use self::core::{Task, TaskId};
