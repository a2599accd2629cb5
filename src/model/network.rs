//! Network identity and stored network configuration.

use std::collections::BTreeSet;
use std::fmt;

/// Opaque identifier of a configured network (its storage row id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NetworkId(pub i64);

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything a session needs to connect to and log one network.
///
/// Read-only to the core once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub id: NetworkId,
    /// Display name, also used in API paths.
    pub name: String,
    pub nick: String,
    pub user: String,
    pub realname: String,
    /// Servers in failover order, `host:port` (`host:+port` for TLS).
    pub servers: Vec<String>,
    /// Channels joined after every successful connect.
    pub channels: BTreeSet<String>,
    /// Raw lines sent right after registration, before any JOIN.
    pub post_connect: Vec<String>,
    pub enabled: bool,
}

/// The set of networks loaded from storage at startup.
#[derive(Debug, Clone, Default)]
pub struct LoggerConfig {
    pub networks: Vec<NetworkConfig>,
}

impl LoggerConfig {
    /// Networks that should get a session.
    pub fn enabled(&self) -> impl Iterator<Item = &NetworkConfig> {
        self.networks.iter().filter(|n| n.enabled)
    }

    pub fn by_name(&self, name: &str) -> Option<&NetworkConfig> {
        self.networks.iter().find(|n| n.name == name)
    }
}
