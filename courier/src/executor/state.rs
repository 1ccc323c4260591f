/// Lifecycle of one executor instance.
///
/// ```text
/// New ──▶ Running ──▶ Stopping ──▶ Stopped
/// ```
///
/// Submissions are accepted in `New` and `Running` (tasks submitted before the
/// consumer starts simply wait in the queue) and rejected from `Stopping`
/// onwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// Created, consumer not started yet.
    New,

    /// Consumer running.
    Running,

    /// Stop requested; no new submissions, remaining work drained or discarded.
    Stopping,

    /// Consumer has exited.
    Stopped,
}

impl Lifecycle {
    /// Returns `true` once submissions are rejected.
    pub fn is_closed(self) -> bool {
        matches!(self, Lifecycle::Stopping | Lifecycle::Stopped)
    }
}
