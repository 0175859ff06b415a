use std::fmt;

/// Lifecycle of a [`ConsumerSession`](crate::ConsumerSession)
///
/// ```text
/// Unconfigured -> Configured -> Connecting -> Connected -> Ready
///                     |              |___________________^   |
///                     |                                      v
///                     +------------(start)------------- Stopped
/// ```
///
/// `Connected` and `Ready` are the two readiness milestones reported by the
/// broker client: connected to the cluster, then partitions assigned to this
/// member of the consumer group. Only `Ready` can receive messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unconfigured,
    Configured,
    Connecting,
    Connected,
    Ready,
    Stopped,
}

/// Inputs that move a session between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Configure,
    Start,
    /// Broker client reached the cluster
    Connect,
    /// Consumer group join completed and partitions were assigned
    Assign,
    /// Broker client is being rebuilt after a crash
    Reconnect,
    Stop,
}

impl SessionState {
    /// Next state for `transition`, or `None` if it does not apply here
    pub fn apply(self, transition: Transition) -> Option<SessionState> {
        use SessionState::*;

        match (self, transition) {
            (Unconfigured, Transition::Configure) => Some(Configured),
            (Configured | Stopped, Transition::Start) => Some(Connecting),
            (Connecting, Transition::Connect) => Some(Connected),
            (Connecting | Connected, Transition::Assign) => Some(Ready),
            (Connecting | Connected | Ready, Transition::Reconnect) => Some(Connecting),
            (Connecting | Connected | Ready, Transition::Stop) => Some(Stopped),
            _ => None,
        }
    }

    pub fn is_ready(self) -> bool {
        self == SessionState::Ready
    }

    pub fn is_connected(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Ready)
    }

    /// Whether a delivery loop is (or should be) running
    pub fn is_active(self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Connected | SessionState::Ready
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unconfigured => "unconfigured",
            SessionState::Configured => "configured",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Ready => "ready",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
