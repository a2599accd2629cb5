//! Connection to an IRC server.
//!
//! The session supervisor drives a [`Transport`]; [`TcpTransport`] is the
//! real one (TCP with optional TLS). Tests substitute scripted transports.

mod stream;
mod tcp;

pub use stream::IrcStream;
pub use tcp::TcpTransport;

use crate::error::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use irclog_proto::Message;
use std::fmt;
use std::str::FromStr;

/// A parsed `host:port` server address. `host:+port` selects TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddr {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl FromStr for ServerAddr {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidAddress(s.to_string());

        let (host, port) = s.trim().rsplit_once(':').ok_or_else(invalid)?;
        let (tls, port) = match port.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, port),
        };
        // Bracketed IPv6 literals: [::1]:6667
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() || host.contains(char::is_whitespace) {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            tls,
        })
    }
}

impl fmt::Display for ServerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let plus = if self.tls { "+" } else { "" };
        if self.host.contains(':') {
            write!(f, "[{}]:{}{}", self.host, plus, self.port)
        } else {
            write!(f, "{}:{}{}", self.host, plus, self.port)
        }
    }
}

/// Identity presented during registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub nick: String,
    pub user: String,
    pub realname: String,
}

/// An inbound line with the time it was read.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub message: Message,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn now(message: Message) -> Self {
        Self {
            message,
            received_at: Utc::now(),
        }
    }
}

/// The protocol collaborator of a session.
#[async_trait]
pub trait Transport: Send {
    /// Connect to `server` and complete registration. Returns the nick the
    /// server accepted.
    async fn connect(
        &mut self,
        server: &str,
        registration: &Registration,
    ) -> Result<String, TransportError>;

    async fn send(&mut self, message: Message) -> Result<(), TransportError>;

    /// Next inbound event, or `None` once the connection is gone.
    ///
    /// Must be cancel-safe: the session races it against commands and
    /// shutdown.
    async fn next_event(&mut self) -> Option<InboundEvent>;

    /// Drop the connection, if any.
    async fn disconnect(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_and_tls() {
        let plain: ServerAddr = "irc.libera.chat:6667".parse().unwrap();
        assert_eq!(plain.host, "irc.libera.chat");
        assert_eq!(plain.port, 6667);
        assert!(!plain.tls);

        let tls: ServerAddr = "irc.libera.chat:+6697".parse().unwrap();
        assert!(tls.tls);
        assert_eq!(tls.port, 6697);
        assert_eq!(tls.to_string(), "irc.libera.chat:+6697");
    }

    #[test]
    fn test_parse_ipv6() {
        let addr: ServerAddr = "[::1]:+6697".parse().unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.to_string(), "[::1]:+6697");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "nohost", ":6667", "host:", "host:+", "host:0", "host:99999", "a b:1"] {
            assert!(bad.parse::<ServerAddr>().is_err(), "{bad:?} should not parse");
        }
    }
}
