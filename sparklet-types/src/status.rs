use std::fmt::Display;

/// Liveness of a node or device as seen from one side of the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    Online,
    Offline,
    /// An ordering or session anomaly was detected; values are no longer trustworthy
    Stale,
    #[default]
    Unknown,
}

impl ConnectionStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, ConnectionStatus::Online)
    }
}

impl Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionStatus::Online => "Online",
            ConnectionStatus::Offline => "Offline",
            ConnectionStatus::Stale => "Stale",
            ConnectionStatus::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}
