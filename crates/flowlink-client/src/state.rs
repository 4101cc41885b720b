use serde::{Deserialize, Serialize};

/// Lifecycle of the single logical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// A caller-initiated connect is in flight.
    Connecting,
    Connected,
    /// Waiting out a backoff delay, or a reconnect attempt is in flight.
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

/// Read-only snapshot of the client, refreshed by the driver after every step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStatus {
    pub state: ConnectionState,
    /// Address of the last connect call.
    pub address: Option<String>,
    pub reconnect_attempts: u32,
    pub queued_messages: usize,
    pub pending_requests: usize,
    pub backgrounded: bool,
}

impl ClientStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}
