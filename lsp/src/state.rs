use std::fmt;

/// Lifecycle of one language-server connection.
///
/// `Initial -> Starting -> Running -> Stopping -> Stopped`, with `StartFailed`
/// reachable only from `Starting`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Initial,
    Starting,
    Running,
    Stopping,
    Stopped,
    StartFailed,
}

impl ClientState {
    /// States in which nothing may be sent to the server.
    #[must_use]
    pub const fn is_inactive(self) -> bool {
        matches!(self, Self::StartFailed | Self::Stopping | Self::Stopped)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::StartFailed => "startFailed",
        }
    }
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
