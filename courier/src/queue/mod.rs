//! The per-executor pending queue.
//!
//! Every executor instance owns exactly one [`PendingSet`]: the ordered
//! collection of tasks submitted but not yet drained. The same mutex also
//! guards the *wait flag* used by the consumer to park when the queue is
//! empty, so that a producer's wake-up and the consumer's emptiness check can
//! never interleave (no lost wake-ups).
//!
//! It is split in two parts:
//! - [`pending`]: the queue itself, submission, swap-drain, carry-over and
//!   closing,
//! - [`gate`]: the blocking drain used by consumer threads.

pub(crate) mod gate;
pub(crate) mod pending;

pub(crate) use gate::Drained;
pub(crate) use pending::{Batch, PendingSet};
