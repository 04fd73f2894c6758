use serde::{Deserialize, Serialize};

/// Reachability of the relay and validity of its upstream credentials, as last
/// observed by a status probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionStatus {
    #[default]
    Unknown,
    Online,
    ConfigurationWarning,
    Error,
    Offline,
    Checking,
}

impl ConnectionStatus {
    /// Turns may only start while the relay is reachable and configured.
    pub fn accepts_turns(&self) -> bool {
        matches!(self, ConnectionStatus::Online)
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Unknown => "unknown",
            ConnectionStatus::Online => "online",
            ConnectionStatus::ConfigurationWarning => "configuration warning",
            ConnectionStatus::Error => "error",
            ConnectionStatus::Offline => "offline",
            ConnectionStatus::Checking => "checking...",
        }
    }

    /// Hint shown where the user would type while input is disabled.
    pub fn input_hint(&self) -> &'static str {
        match self {
            ConnectionStatus::Online => "Type your question...",
            ConnectionStatus::Checking => "Checking connection...",
            ConnectionStatus::Offline => "Server offline, messages cannot be sent",
            _ => "Server unavailable, messages cannot be sent",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
