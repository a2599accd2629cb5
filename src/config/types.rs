//! Core configuration types and loading.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use super::defaults::*;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
///
/// Every section is optional; an empty file yields a working configuration
/// that logs whatever networks are already stored in the database.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Session and ingestion tuning.
    #[serde(default)]
    pub logger: LoggerSettings,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub tail: TailConfig,
    /// Historical HTTP API and `/metrics`. Omit to disable.
    pub api: Option<ApiConfig>,
    /// Networks inserted into the database when no network of that name exists.
    #[serde(default)]
    pub networks: Vec<NetworkSeed>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Diagnostic logging. `RUST_LOG` overrides `level` when set.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `"info"` or `"irclogd=debug,sqlx=warn"`.
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Session supervisor and ingestion settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggerSettings {
    /// Capacity of the shared record queue; producers block when it is full.
    #[serde(default = "default_ingest_queue_capacity")]
    pub ingest_queue_capacity: usize,
    /// Wait between a disconnect and the next connect attempt.
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    /// Pause between auto-joins (flood protection).
    #[serde(default = "default_join_delay_ms")]
    pub join_delay_ms: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Time allowed between TCP connect and RPL_WELCOME.
    #[serde(default = "default_registration_timeout_secs")]
    pub registration_timeout_secs: u64,
    /// Extra attempts for a failed write. 0 drops the record on first failure.
    #[serde(default)]
    pub persist_retries: u32,
    #[serde(default = "default_persist_retry_delay_ms")]
    pub persist_retry_delay_ms: u64,
    /// Real name used for networks that do not set one.
    #[serde(default = "default_realname")]
    pub realname: String,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            ingest_queue_capacity: default_ingest_queue_capacity(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            join_delay_ms: default_join_delay_ms(),
            connect_timeout_secs: default_connect_timeout_secs(),
            registration_timeout_secs: default_registration_timeout_secs(),
            persist_retries: 0,
            persist_retry_delay_ms: default_persist_retry_delay_ms(),
            realname: default_realname(),
        }
    }
}

impl LoggerSettings {
    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn join_delay(&self) -> Duration {
        Duration::from_millis(self.join_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn registration_timeout(&self) -> Duration {
        Duration::from_secs(self.registration_timeout_secs)
    }

    pub fn persist_retry_delay(&self) -> Duration {
        Duration::from_millis(self.persist_retry_delay_ms)
    }
}

/// Command router settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_router_interval_ms")]
    pub interval_ms: u64,
    /// How long a session gets to take a command before it is left pending.
    #[serde(default = "default_handoff_timeout_secs")]
    pub handoff_timeout_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_router_interval_ms(),
            handoff_timeout_secs: default_handoff_timeout_secs(),
        }
    }
}

impl RouterConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn handoff_timeout(&self) -> Duration {
        Duration::from_secs(self.handoff_timeout_secs)
    }
}

/// Live-tail WebSocket listener.
#[derive(Debug, Clone, Deserialize)]
pub struct TailConfig {
    #[serde(default = "default_tail_address")]
    pub address: SocketAddr,
    #[serde(default = "default_tail_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Set to false to run without the live-tail listener.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            address: default_tail_address(),
            poll_interval_ms: default_tail_poll_interval_ms(),
            enabled: true,
        }
    }
}

impl TailConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Historical query API listener.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub address: SocketAddr,
}

/// A network declared in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkSeed {
    pub name: String,
    pub nick: String,
    /// Defaults to the nick.
    pub user: Option<String>,
    pub realname: Option<String>,
    pub servers: Vec<String>,
    #[serde(default)]
    pub channels: Vec<String>,
    #[serde(default)]
    pub post_connect: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}
