//! Session lifecycle states.

use std::fmt;

/// Where a session is in its connect/reconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not connected. The first time through the session connects right
    /// away; afterwards it backs off and moves to the next server.
    Disconnected,
    /// Connecting and registering with the current server.
    Connecting,
    /// Registered; events are logged and commands applied.
    Connected,
    /// Quit on request. Only a `Connect` command leaves this state.
    DisconnectedAwaitingConnect,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::DisconnectedAwaitingConnect => "awaiting_connect",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
