/// Lifecycle status of a cluster service or view.
///
/// Views only ever report `Stopped` or `Started`; the intermediate states are
/// used by services while they propagate a start or stop to their views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServiceStatus {
    #[default]
    Stopped,
    Starting,
    Started,
    Stopping,
}

impl ServiceStatus {
    /// Convert to string for logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Starting => "starting",
            Self::Started => "started",
            Self::Stopping => "stopping",
        }
    }

    /// Whether views may be started while the owner is in this state.
    pub fn is_run_allowed(&self) -> bool {
        matches!(self, Self::Starting | Self::Started)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
