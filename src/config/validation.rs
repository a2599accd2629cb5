//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early. Both the
//! TOML file and the networks loaded from the database are checked; any
//! error is fatal.

use super::Config;
use crate::model::LoggerConfig;
use crate::transport::ServerAddr;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("logger.ingest_queue_capacity must be at least 1")]
    ZeroQueueCapacity,
    #[error("router.interval_ms must be greater than 0")]
    ZeroRouterInterval,
    #[error("router.handoff_timeout_secs must be greater than 0")]
    ZeroHandoffTimeout,
    #[error("tail.poll_interval_ms must be greater than 0")]
    ZeroPollInterval,
    #[error("database.path parent directory does not exist: {0}")]
    DatabasePathInvalid(String),
    #[error("network name is required")]
    MissingNetworkName,
    #[error("network {0} is declared more than once")]
    DuplicateNetwork(String),
    #[error("network {0}: nick is required")]
    MissingNick(String),
    #[error("network {0}: enabled but has no servers")]
    NoServers(String),
    #[error("network {network}: invalid server address {address:?}")]
    InvalidServer { network: String, address: String },
    #[error("network {network}: post-connect line is not a valid IRC message: {line:?}")]
    InvalidPostConnect { network: String, line: String },
}

/// Validate a configuration file, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.logger.ingest_queue_capacity == 0 {
        errors.push(ValidationError::ZeroQueueCapacity);
    }
    if config.router.interval_ms == 0 {
        errors.push(ValidationError::ZeroRouterInterval);
    }
    if config.router.handoff_timeout_secs == 0 {
        errors.push(ValidationError::ZeroHandoffTimeout);
    }
    if config.tail.poll_interval_ms == 0 {
        errors.push(ValidationError::ZeroPollInterval);
    }

    if config.database.path != ":memory:" {
        let db_path = Path::new(&config.database.path);
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::DatabasePathInvalid(
                config.database.path.clone(),
            ));
        }
    }

    let mut seen = HashSet::new();
    for seed in &config.networks {
        if seed.name.is_empty() {
            errors.push(ValidationError::MissingNetworkName);
            continue;
        }
        if !seen.insert(seed.name.as_str()) {
            errors.push(ValidationError::DuplicateNetwork(seed.name.clone()));
        }
        check_network(
            &seed.name,
            &seed.nick,
            seed.enabled,
            &seed.servers,
            &seed.post_connect,
            &mut errors,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate the networks loaded from storage.
pub fn validate_networks(config: &LoggerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    for network in &config.networks {
        check_network(
            &network.name,
            &network.nick,
            network.enabled,
            &network.servers,
            &network.post_connect,
            &mut errors,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_network(
    name: &str,
    nick: &str,
    enabled: bool,
    servers: &[String],
    post_connect: &[String],
    errors: &mut Vec<ValidationError>,
) {
    if nick.is_empty() {
        errors.push(ValidationError::MissingNick(name.to_string()));
    }
    if enabled && servers.is_empty() {
        errors.push(ValidationError::NoServers(name.to_string()));
    }
    for address in servers {
        if address.parse::<ServerAddr>().is_err() {
            errors.push(ValidationError::InvalidServer {
                network: name.to_string(),
                address: address.clone(),
            });
        }
    }
    for line in post_connect {
        if line.parse::<irclog_proto::Message>().is_err() {
            errors.push(ValidationError::InvalidPostConnect {
                network: name.to_string(),
                line: line.clone(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NetworkConfig, NetworkId};

    fn minimal_valid_config() -> String {
        r##"
[database]
path = ":memory:"

[[networks]]
name = "example"
nick = "logbot"
servers = ["irc.example.net:6667"]
channels = ["#rust"]
"##
        .to_string()
    }

    #[test]
    fn test_valid_config_passes() {
        let config: Config = toml::from_str(&minimal_valid_config()).unwrap();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_all_errors_are_reported() {
        let config: Config = toml::from_str(
            r##"
[logger]
ingest_queue_capacity = 0

[router]
interval_ms = 0

[[networks]]
name = "a"
nick = ""
servers = []

[[networks]]
name = "a"
nick = "bot"
servers = ["no-port-here"]
post_connect = [""]
"##,
        )
        .unwrap();
        let errors = validate(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::ZeroQueueCapacity));
        assert!(errors.contains(&ValidationError::ZeroRouterInterval));
        assert!(errors.contains(&ValidationError::MissingNick("a".into())));
        assert!(errors.contains(&ValidationError::NoServers("a".into())));
        assert!(errors.contains(&ValidationError::DuplicateNetwork("a".into())));
        assert!(errors.contains(&ValidationError::InvalidServer {
            network: "a".into(),
            address: "no-port-here".into(),
        }));
        assert!(errors.contains(&ValidationError::InvalidPostConnect {
            network: "a".into(),
            line: String::new(),
        }));
    }

    #[test]
    fn test_disabled_network_may_have_no_servers() {
        let stored = LoggerConfig {
            networks: vec![NetworkConfig {
                id: NetworkId(1),
                name: "parked".into(),
                nick: "bot".into(),
                user: "bot".into(),
                realname: "bot".into(),
                servers: vec![],
                channels: Default::default(),
                post_connect: vec![],
                enabled: false,
            }],
        };
        assert!(validate_networks(&stored).is_ok());

        let mut enabled = stored.clone();
        enabled.networks[0].enabled = true;
        assert_eq!(
            validate_networks(&enabled),
            Err(vec![ValidationError::NoServers("parked".into())])
        );
    }
}
