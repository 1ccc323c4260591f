//! The executor facade.
//!
//! A [`Dispatcher`] is built once at startup with a [`DispatcherBuilder`]
//! and passed by reference to every subsystem that needs to move work
//! between threads. It owns the background pool, the UI-affined executor and
//! the engine queue, and routes submissions to them.

pub(crate) mod builder;
pub(crate) mod core;

pub use builder::DispatcherBuilder;
pub use self::core::Dispatcher;
