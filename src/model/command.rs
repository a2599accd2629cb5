//! Control commands.
//!
//! Commands are produced outside the daemon (rows in the command queue),
//! routed by network id, and applied by the owning session.

use std::fmt;
use thiserror::Error;

use super::NetworkId;

/// Storage id of a queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandId(pub i64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a command asks the session to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// Join `channel`.
    StartLogging { channel: String },
    /// Part `channel`.
    StopLogging { channel: String },
    /// Quit and stay offline until a `Connect` arrives.
    Disconnect,
    /// Leave the offline state entered by `Disconnect`.
    Connect,
    /// Send `message` to `target`.
    SendMessage { target: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown command kind: {0}")]
pub struct UnknownCommandKind(pub String);

impl CommandKind {
    /// Name stored in the `kind` column.
    pub fn name(&self) -> &'static str {
        match self {
            CommandKind::StartLogging { .. } => "start_logging",
            CommandKind::StopLogging { .. } => "stop_logging",
            CommandKind::Disconnect => "disconnect",
            CommandKind::Connect => "connect",
            CommandKind::SendMessage { .. } => "send_message",
        }
    }

    /// Rebuild a kind from its stored columns. Unused columns are ignored.
    pub fn from_parts(
        kind: &str,
        channel: String,
        target: String,
        message: String,
    ) -> Result<Self, UnknownCommandKind> {
        Ok(match kind {
            "start_logging" => CommandKind::StartLogging { channel },
            "stop_logging" => CommandKind::StopLogging { channel },
            "disconnect" => CommandKind::Disconnect,
            "connect" => CommandKind::Connect,
            "send_message" => CommandKind::SendMessage { target, message },
            other => return Err(UnknownCommandKind(other.to_string())),
        })
    }

    /// The `(channel, target, message)` columns for storage.
    pub fn columns(&self) -> (&str, &str, &str) {
        match self {
            CommandKind::StartLogging { channel } | CommandKind::StopLogging { channel } => {
                (channel.as_str(), "", "")
            }
            CommandKind::SendMessage { target, message } => ("", target.as_str(), message.as_str()),
            CommandKind::Disconnect | CommandKind::Connect => ("", "", ""),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::StartLogging { channel } | CommandKind::StopLogging { channel } => {
                write!(f, "{} {}", self.name(), channel)
            }
            CommandKind::SendMessage { target, .. } => write!(f, "{} {}", self.name(), target),
            CommandKind::Disconnect | CommandKind::Connect => f.write_str(self.name()),
        }
    }
}

/// A pending (or completed) control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCommand {
    pub id: CommandId,
    pub network_id: NetworkId,
    pub kind: CommandKind,
    pub complete: bool,
}
