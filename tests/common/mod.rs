//! Integration test common infrastructure.
//!
//! Provides an in-process fake IRC server and fixtures for driving the
//! logger end to end.

pub mod ircd;

#[allow(unused_imports)]
pub use ircd::{FakeConnection, FakeIrcd};

use irclogd::model::{NetworkConfig, NetworkId};
use irclogd::session::SessionSettings;
use std::collections::BTreeSet;
use std::time::Duration;

/// A one-server network pointing at `address`.
#[allow(dead_code)]
pub fn network(id: NetworkId, address: &str, channels: &[&str]) -> NetworkConfig {
    NetworkConfig {
        id,
        name: format!("net{id}"),
        nick: "logbot".into(),
        user: "logbot".into(),
        realname: "irclogd test".into(),
        servers: vec![address.to_string()],
        channels: channels.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
        post_connect: vec![],
        enabled: true,
    }
}

/// Session timings short enough for tests.
#[allow(dead_code)]
pub fn fast_settings() -> SessionSettings {
    SessionSettings {
        reconnect_backoff: Duration::from_millis(10),
        join_delay: Duration::from_millis(0),
    }
}

/// Poll `check` until it returns `Some` or five seconds pass.
#[allow(dead_code)]
pub async fn eventually<T, F, Fut>(mut check: F) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = check().await {
            return Ok(value);
        }
        if tokio::time::Instant::now() > deadline {
            anyhow::bail!("condition not met within 5s");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
