use crate::session::ScanSession;

/// Lifecycle of a scanner view
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Failed,
}

/// Why the harness stopped waiting
#[derive(Debug, Clone, PartialEq)]
pub enum ShutdownReason {
    Signal(String),
    UserRequest,
}

/// How a wait on the active session ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Settled(ScanSession),
    Interrupted(ShutdownReason),
    /// The view was switched or closed before the session settled
    Closed,
}
