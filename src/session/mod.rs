//! Per-network session supervision.
//!
//! Each enabled network gets one supervisor task that owns its transport,
//! reconnects with round-robin server failover, turns protocol events into
//! [`LogRecord`]s and applies control commands delivered by the router.
//!
//! Commands reach a session through a [`SessionHandle`]. Delivery is a
//! rendezvous: [`SessionHandle::deliver`] resolves only once the session task
//! has taken the command. A command whose delivery was abandoned (the caller
//! timed out) is discarded by the session when it finally reads it.

mod state;
mod supervisor;
mod translate;

pub use state::SessionState;
pub use supervisor::{SessionSettings, Supervisor};
pub use translate::translate;

use crate::config::LoggerSettings;
use crate::error::DeliveryError;
use crate::model::{ControlCommand, LogRecord, NetworkConfig, NetworkId};
use crate::transport::Transport;
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// A command in flight from the router to a session.
#[derive(Debug)]
pub struct CommandEnvelope {
    command: ControlCommand,
    ack: oneshot::Sender<()>,
}

impl CommandEnvelope {
    pub fn new(command: ControlCommand) -> (Self, oneshot::Receiver<()>) {
        let (ack, rx) = oneshot::channel();
        (Self { command, ack }, rx)
    }

    /// Take the command, telling the sender it arrived. Returns `None` when
    /// the sender already gave up on this delivery.
    pub fn accept(self) -> Option<ControlCommand> {
        match self.ack.send(()) {
            Ok(()) => Some(self.command),
            Err(()) => None,
        }
    }

    pub fn command(&self) -> &ControlCommand {
        &self.command
    }
}

/// The router-facing side of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    network_id: NetworkId,
    commands: mpsc::Sender<CommandEnvelope>,
    shutdown: CancellationToken,
}

impl SessionHandle {
    pub fn new(
        network_id: NetworkId,
        commands: mpsc::Sender<CommandEnvelope>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            network_id,
            commands,
            shutdown,
        }
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    /// Hand a command to the session and wait until it has been taken.
    ///
    /// Not bounded in time; callers race it against their own timeout.
    /// Dropping the future abandons the delivery.
    pub async fn deliver(&self, command: ControlCommand) -> Result<(), DeliveryError> {
        let (envelope, taken) = CommandEnvelope::new(command);
        self.commands
            .send(envelope)
            .await
            .map_err(|_| DeliveryError::SessionClosed)?;
        taken.await.map_err(|_| DeliveryError::SessionClosed)
    }

    /// Ask the session to quit and stop. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Network id to session handle. Built once before workers start and never
/// mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    handles: HashMap<NetworkId, SessionHandle>,
}

impl SessionRegistry {
    pub fn new(handles: impl IntoIterator<Item = SessionHandle>) -> Self {
        Self {
            handles: handles
                .into_iter()
                .map(|handle| (handle.network_id, handle))
                .collect(),
        }
    }

    pub fn get(&self, network_id: NetworkId) -> Option<&SessionHandle> {
        self.handles.get(&network_id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn shutdown_all(&self) {
        for handle in self.handles.values() {
            handle.shutdown();
        }
    }
}

/// Start a supervisor for `config` on its own task.
pub fn spawn<T>(
    config: NetworkConfig,
    settings: SessionSettings,
    transport: T,
    records: mpsc::Sender<LogRecord>,
) -> (SessionHandle, JoinHandle<()>)
where
    T: Transport + 'static,
{
    // Capacity 1: at most one abandoned envelope can sit in the buffer.
    let (commands_tx, commands_rx) = mpsc::channel(1);
    let shutdown = CancellationToken::new();
    let handle = SessionHandle::new(config.id, commands_tx, shutdown.clone());

    let span = crate::telemetry::spans::session(config.id, &config.name);
    let supervisor = Supervisor::new(config, settings, transport, records, commands_rx, shutdown);
    let task = tokio::spawn(supervisor.run().instrument(span));

    (handle, task)
}

impl From<&LoggerSettings> for SessionSettings {
    fn from(settings: &LoggerSettings) -> Self {
        Self {
            reconnect_backoff: settings.reconnect_backoff(),
            join_delay: settings.join_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CommandId, CommandKind};
    use std::time::Duration;

    fn command(id: i64) -> ControlCommand {
        ControlCommand {
            id: CommandId(id),
            network_id: NetworkId(1),
            kind: CommandKind::Connect,
            complete: false,
        }
    }

    #[tokio::test]
    async fn test_deliver_resolves_when_taken() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = SessionHandle::new(NetworkId(1), tx, CancellationToken::new());

        let reader = tokio::spawn(async move { rx.recv().await.unwrap().accept() });
        handle.deliver(command(5)).await.unwrap();
        assert_eq!(reader.await.unwrap().map(|c| c.id), Some(CommandId(5)));
    }

    #[tokio::test]
    async fn test_abandoned_delivery_is_discarded_by_reader() {
        let (tx, mut rx) = mpsc::channel(1);
        let handle = SessionHandle::new(NetworkId(1), tx, CancellationToken::new());

        let attempt = tokio::time::timeout(Duration::from_millis(20), handle.deliver(command(1))).await;
        assert!(attempt.is_err());

        let stale = rx.recv().await.unwrap();
        assert_eq!(stale.command().id, CommandId(1));
        assert!(stale.accept().is_none());
    }

    #[tokio::test]
    async fn test_deliver_to_closed_session() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = SessionHandle::new(NetworkId(1), tx, CancellationToken::new());
        assert_eq!(
            handle.deliver(command(1)).await,
            Err(DeliveryError::SessionClosed)
        );
    }

    #[test]
    fn test_registry_lookup_and_shutdown() {
        let (tx, _rx) = mpsc::channel(1);
        let a = SessionHandle::new(NetworkId(1), tx.clone(), CancellationToken::new());
        let b = SessionHandle::new(NetworkId(2), tx, CancellationToken::new());
        let registry = SessionRegistry::new([a, b]);

        assert_eq!(registry.len(), 2);
        assert!(registry.get(NetworkId(3)).is_none());
        registry.shutdown_all();
        assert!(registry.get(NetworkId(1)).unwrap().is_shut_down());
        assert!(registry.get(NetworkId(2)).unwrap().is_shut_down());
    }
}
