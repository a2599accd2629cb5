//! The session supervisor task.

use super::{CommandEnvelope, SessionState, translate};
use crate::metrics;
use crate::model::{CommandKind, ControlCommand, LogRecord, NetworkConfig};
use crate::transport::{InboundEvent, Registration, Transport};
use chrono::{DateTime, Utc};
use irclog_proto::{Message, is_middle_param};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PART_REASON: &str = "told to part";
const DISCONNECT_REASON: &str = "disconnecting...";
const SHUTDOWN_REASON: &str = "shutting down";

/// Timing knobs for a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Wait after a disconnect before moving to the next server.
    pub reconnect_backoff: Duration,
    /// Pause between auto-joins.
    pub join_delay: Duration,
}

/// Owns one network connection and its reconnect policy.
pub struct Supervisor<T> {
    config: NetworkConfig,
    settings: SessionSettings,
    transport: T,
    records: mpsc::Sender<LogRecord>,
    commands: mpsc::Receiver<CommandEnvelope>,
    shutdown: CancellationToken,
    state: SessionState,
    /// Index into `config.servers` of the server to use next.
    current: usize,
    started: bool,
    last_timestamp: Option<DateTime<Utc>>,
    metric_label: String,
}

impl<T: Transport> Supervisor<T> {
    pub fn new(
        config: NetworkConfig,
        settings: SessionSettings,
        transport: T,
        records: mpsc::Sender<LogRecord>,
        commands: mpsc::Receiver<CommandEnvelope>,
        shutdown: CancellationToken,
    ) -> Self {
        let metric_label = config.id.to_string();
        Self {
            config,
            settings,
            transport,
            records,
            commands,
            shutdown,
            state: SessionState::Disconnected,
            current: 0,
            started: false,
            last_timestamp: None,
            metric_label,
        }
    }

    /// Run until shut down. The reconnect loop never ends on its own.
    pub async fn run(mut self) {
        if self.config.servers.is_empty() {
            warn!("No servers configured, session idle until shutdown");
            self.shutdown.cancelled().await;
            return;
        }

        info!(servers = self.config.servers.len(), "Session starting");
        loop {
            let next = match self.state {
                SessionState::Disconnected => self.leave_disconnected().await,
                SessionState::Connecting => self.connect().await,
                SessionState::Connected => {
                    metrics::session_connected();
                    let next = self.serve().await;
                    metrics::session_disconnected();
                    next
                }
                SessionState::DisconnectedAwaitingConnect => self.await_connect().await,
            };

            match next {
                Some(state) => {
                    debug!(from = %self.state, to = %state, "Session state change");
                    self.state = state;
                }
                None => break,
            }
        }

        self.transport.disconnect().await;
        info!("Session stopped");
    }

    /// First start connects at once; later entries back off and rotate.
    async fn leave_disconnected(&mut self) -> Option<SessionState> {
        if self.started {
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                _ = tokio::time::sleep(self.settings.reconnect_backoff) => {}
            }
            self.current = (self.current + 1) % self.config.servers.len();
        }
        self.started = true;
        Some(SessionState::Connecting)
    }

    async fn connect(&mut self) -> Option<SessionState> {
        let server = self.config.servers[self.current].clone();
        let registration = Registration {
            nick: self.config.nick.clone(),
            user: self.config.user.clone(),
            realname: self.config.realname.clone(),
        };

        info!(server = %server, "Connecting");
        let result = tokio::select! {
            _ = self.shutdown.cancelled() => return None,
            result = self.transport.connect(&server, &registration) => result,
        };

        let nick = match result {
            Ok(nick) => nick,
            Err(e) => {
                warn!(server = %server, error = %e, "Connect failed");
                metrics::record_connect(&self.metric_label, e.error_code());
                return Some(SessionState::Disconnected);
            }
        };
        metrics::record_connect(&self.metric_label, "ok");
        info!(server = %server, nick = %nick, "Connected");

        for line in self.config.post_connect.clone() {
            let message = match line.parse::<Message>() {
                Ok(message) => message,
                Err(e) => {
                    warn!(line = %line, error = %e, "Skipping unparsable post-connect line");
                    continue;
                }
            };
            debug!(line = %line, "Sending post-connect line");
            if let Err(e) = self.transport.send(message).await {
                warn!(error = %e, "Send failed during post-connect");
                return Some(SessionState::Disconnected);
            }
        }

        let channels: Vec<String> = self.config.channels.iter().cloned().collect();
        for (i, channel) in channels.iter().enumerate() {
            if i > 0 {
                tokio::select! {
                    _ = self.shutdown.cancelled() => {
                        self.quit(SHUTDOWN_REASON).await;
                        return None;
                    }
                    _ = tokio::time::sleep(self.settings.join_delay) => {}
                }
            }
            debug!(channel = %channel, "Joining");
            if let Err(e) = self.transport.send(Message::join(channel)).await {
                warn!(channel = %channel, error = %e, "Join failed");
                return Some(SessionState::Disconnected);
            }
        }

        Some(SessionState::Connected)
    }

    async fn serve(&mut self) -> Option<SessionState> {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    self.quit(SHUTDOWN_REASON).await;
                    return None;
                }
                Some(envelope) = self.commands.recv() => {
                    let Some(command) = envelope.accept() else {
                        debug!("Discarding abandoned command");
                        continue;
                    };
                    if let Some(next) = self.apply(command).await {
                        return Some(next);
                    }
                }
                event = self.transport.next_event() => match event {
                    Some(event) => self.record(event).await,
                    None => {
                        warn!("Disconnected");
                        return Some(SessionState::Disconnected);
                    }
                },
            }
        }
    }

    /// Apply a command while connected. Returns a state to move to, if any.
    async fn apply(&mut self, command: ControlCommand) -> Option<SessionState> {
        info!(command_id = %command.id, command = %command.kind, "Applying command");
        let (message, target) = match command.kind {
            CommandKind::StartLogging { channel } => (Message::join(&channel), channel),
            CommandKind::StopLogging { channel } => (Message::part(&channel, PART_REASON), channel),
            CommandKind::SendMessage { target, message } => {
                (Message::privmsg(&target, &message), target)
            }
            CommandKind::Connect => {
                info!("Connect while connected is not implemented, ignoring");
                return None;
            }
            CommandKind::Disconnect => {
                self.quit(DISCONNECT_REASON).await;
                return Some(SessionState::DisconnectedAwaitingConnect);
            }
        };

        if !is_middle_param(&target) {
            warn!(command_id = %command.id, target = ?target, "Dropping command with an unusable target");
            return None;
        }
        let line = message.to_string();
        if line.contains(['\r', '\n']) {
            warn!(command_id = %command.id, "Dropping command with an embedded line break");
            return None;
        }
        if let Err(e) = self.transport.send(message).await {
            warn!(command_id = %command.id, error = %e, "Send failed");
            return Some(SessionState::Disconnected);
        }
        None
    }

    async fn await_connect(&mut self) -> Option<SessionState> {
        info!("Waiting for a connect command");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return None,
                envelope = self.commands.recv() => {
                    let Some(envelope) = envelope else {
                        // Nobody can send Connect any more.
                        self.shutdown.cancelled().await;
                        return None;
                    };
                    match envelope.accept() {
                        Some(command) if command.kind == CommandKind::Connect => {
                            info!(command_id = %command.id, "Reconnecting");
                            return Some(SessionState::Connecting);
                        }
                        Some(command) => {
                            info!(command_id = %command.id, command = %command.kind, "Command dropped while disconnected");
                        }
                        None => debug!("Discarding abandoned command"),
                    }
                }
            }
        }
    }

    async fn record(&mut self, event: InboundEvent) {
        // Records from one session never go back in time.
        let mut timestamp = event.received_at;
        if let Some(last) = self.last_timestamp
            && timestamp < last
        {
            timestamp = last;
        }
        self.last_timestamp = Some(timestamp);

        let Some(record) = translate(self.config.id, &event, timestamp) else {
            return;
        };
        if self.records.send(record).await.is_err() {
            warn!("Ingestion queue closed, record lost");
            metrics::record_dropped("queue_closed");
        }
    }

    async fn quit(&mut self, reason: &str) {
        if let Err(e) = self.transport.send(Message::quit(reason)).await {
            debug!(error = %e, "QUIT not sent");
        }
        self.transport.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::model::{CommandId, LogKind, NetworkId};
    use crate::session::{SessionHandle, spawn};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Script {
        attempts: Vec<String>,
        sent: Vec<String>,
        fail_connect: bool,
    }

    /// In-process transport driven by the test.
    struct ScriptedTransport {
        script: Arc<Mutex<Script>>,
        /// `None`: the connection drops right after registration.
        events: Option<mpsc::UnboundedReceiver<InboundEvent>>,
        connected: bool,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn connect(
            &mut self,
            server: &str,
            registration: &Registration,
        ) -> Result<String, TransportError> {
            let mut script = self.script.lock().unwrap();
            script.attempts.push(server.to_string());
            if script.fail_connect {
                return Err(TransportError::Closed);
            }
            self.connected = true;
            Ok(registration.nick.clone())
        }

        async fn send(&mut self, message: Message) -> Result<(), TransportError> {
            if !self.connected {
                return Err(TransportError::NotConnected);
            }
            self.script.lock().unwrap().sent.push(message.to_string());
            Ok(())
        }

        async fn next_event(&mut self) -> Option<InboundEvent> {
            let event = match self.events.as_mut() {
                Some(rx) => rx.recv().await,
                None => None,
            };
            if event.is_none() {
                self.connected = false;
            }
            event
        }

        async fn disconnect(&mut self) {
            self.connected = false;
        }
    }

    fn network(servers: &[&str]) -> NetworkConfig {
        NetworkConfig {
            id: NetworkId(1),
            name: "testnet".into(),
            nick: "logbot".into(),
            user: "logbot".into(),
            realname: "logbot".into(),
            servers: servers.iter().map(|s| s.to_string()).collect(),
            channels: ["#a".to_string(), "#b".to_string()].into_iter().collect(),
            post_connect: vec!["PRIVMSG NickServ :IDENTIFY pw".into()],
            enabled: true,
        }
    }

    fn settings() -> SessionSettings {
        SessionSettings {
            reconnect_backoff: Duration::from_millis(1),
            join_delay: Duration::from_millis(1),
        }
    }

    struct Harness {
        script: Arc<Mutex<Script>>,
        events: mpsc::UnboundedSender<InboundEvent>,
        records: mpsc::Receiver<LogRecord>,
        handle: SessionHandle,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(config: NetworkConfig, script: Script, live: bool) -> Harness {
        start_with_queue(config, script, live, 20)
    }

    fn start_with_queue(
        config: NetworkConfig,
        script: Script,
        live: bool,
        queue_capacity: usize,
    ) -> Harness {
        let script = Arc::new(Mutex::new(script));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (records_tx, records_rx) = mpsc::channel(queue_capacity);
        let transport = ScriptedTransport {
            script: script.clone(),
            events: live.then_some(events_rx),
            connected: false,
        };
        let (handle, task) = spawn(config, settings(), transport, records_tx);
        Harness {
            script,
            events: events_tx,
            records: records_rx,
            handle,
            task,
        }
    }

    async fn wait_until(script: &Arc<Mutex<Script>>, check: impl Fn(&Script) -> bool) {
        let result = tokio::time::timeout(Duration::from_secs(5), async {
            while !check(&script.lock().unwrap()) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await;
        assert!(result.is_ok(), "condition not reached in time");
    }

    fn command(kind: CommandKind) -> ControlCommand {
        ControlCommand {
            id: CommandId(1),
            network_id: NetworkId(1),
            kind,
            complete: false,
        }
    }

    fn inbound(line: &str) -> InboundEvent {
        InboundEvent::now(line.parse().unwrap())
    }

    #[tokio::test]
    async fn test_failed_connects_cycle_servers() {
        let h = start(
            network(&["s0:6667", "s1:6667", "s2:6667"]),
            Script {
                fail_connect: true,
                ..Default::default()
            },
            true,
        );
        wait_until(&h.script, |s| s.attempts.len() >= 4).await;
        h.handle.shutdown();
        h.task.await.unwrap();

        let attempts = h.script.lock().unwrap().attempts.clone();
        assert_eq!(attempts[..4], ["s0:6667", "s1:6667", "s2:6667", "s0:6667"]);
    }

    #[tokio::test]
    async fn test_immediate_disconnects_cycle_servers() {
        let h = start(network(&["s0:6667", "s1:6667", "s2:6667"]), Script::default(), false);
        wait_until(&h.script, |s| s.attempts.len() >= 4).await;
        h.handle.shutdown();
        h.task.await.unwrap();

        let attempts = h.script.lock().unwrap().attempts.clone();
        assert_eq!(attempts[..4], ["s0:6667", "s1:6667", "s2:6667", "s0:6667"]);
    }

    #[tokio::test]
    async fn test_post_connect_then_joins() {
        let h = start(network(&["s0:6667"]), Script::default(), true);
        wait_until(&h.script, |s| s.sent.len() >= 3).await;

        let sent = h.script.lock().unwrap().sent.clone();
        assert_eq!(
            sent,
            vec!["PRIVMSG NickServ :IDENTIFY pw", "JOIN #a", "JOIN #b"]
        );
        h.handle.shutdown();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_post_connect_join_keeps_its_key() {
        let mut config = network(&["s0:6667"]);
        config.post_connect = vec!["JOIN #secret hunter2".into(), "MODE logbot +B".into()];
        let h = start(config, Script::default(), true);
        wait_until(&h.script, |s| s.sent.len() >= 4).await;

        let sent = h.script.lock().unwrap().sent[..2].to_vec();
        assert_eq!(sent, vec!["JOIN #secret hunter2", "MODE logbot +B"]);
        h.handle.shutdown();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_events_become_records_in_order() {
        let mut h = start(network(&["s0:6667"]), Script::default(), true);
        wait_until(&h.script, |s| s.sent.len() >= 3).await;

        for line in [
            ":alice!al@a.org PRIVMSG #a :first",
            ":alice!al@a.org NOTICE logbot :not logged",
            ":A!a@h KICK #a B :bye",
            ":alice!al@a.org QUIT :gone",
        ] {
            h.events.send(inbound(line)).unwrap();
        }

        let mut records = Vec::new();
        for _ in 0..3 {
            records.push(h.records.recv().await.unwrap());
        }
        let kinds: Vec<_> = records.iter().map(|r| r.kind).collect();
        assert_eq!(kinds, vec![LogKind::Message, LogKind::Kick, LogKind::Quit]);
        assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(records[1].target.as_deref(), Some("B"));
        for record in &records {
            assert_eq!(record.date_bucket(), record.timestamp.format("%Y-%m-%d").to_string());
        }

        h.handle.shutdown();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_while_connected() {
        let h = start(network(&["s0:6667"]), Script::default(), true);
        wait_until(&h.script, |s| s.sent.len() >= 3).await;

        for kind in [
            CommandKind::StartLogging {
                channel: "#new".into(),
            },
            CommandKind::StopLogging {
                channel: "#a".into(),
            },
            CommandKind::SendMessage {
                target: "alice".into(),
                message: "hi there".into(),
            },
            CommandKind::Connect,
        ] {
            h.handle.deliver(command(kind)).await.unwrap();
        }
        wait_until(&h.script, |s| s.sent.len() >= 6).await;

        let sent = h.script.lock().unwrap().sent[3..].to_vec();
        assert_eq!(
            sent,
            vec!["JOIN #new", "PART #a :told to part", "PRIVMSG alice :hi there"]
        );
        h.handle.shutdown();
        h.task.await.unwrap();
        let last = h.script.lock().unwrap().sent.last().cloned();
        assert_eq!(last.as_deref(), Some("QUIT :shutting down"));
    }

    #[tokio::test]
    async fn test_unusable_targets_are_dropped() {
        let h = start(network(&["s0:6667"]), Script::default(), true);
        wait_until(&h.script, |s| s.sent.len() >= 3).await;

        for kind in [
            CommandKind::SendMessage {
                target: "alice bob".into(),
                message: "hi".into(),
            },
            CommandKind::StartLogging {
                channel: "#a b".into(),
            },
            CommandKind::StopLogging {
                channel: ":#a".into(),
            },
            CommandKind::SendMessage {
                target: String::new(),
                message: "hi".into(),
            },
            CommandKind::SendMessage {
                target: "alice".into(),
                message: "still here".into(),
            },
        ] {
            h.handle.deliver(command(kind)).await.unwrap();
        }
        wait_until(&h.script, |s| s.sent.len() >= 4).await;

        {
            let script = h.script.lock().unwrap();
            assert_eq!(script.sent[3..], ["PRIVMSG alice :still here"]);
            assert_eq!(script.attempts.len(), 1);
        }
        h.handle.shutdown();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_line_breaks_in_text_are_dropped() {
        let h = start(network(&["s0:6667"]), Script::default(), true);
        wait_until(&h.script, |s| s.sent.len() >= 3).await;

        h.handle
            .deliver(command(CommandKind::SendMessage {
                target: "alice".into(),
                message: "hi\r\nQUIT :bye".into(),
            }))
            .await
            .unwrap();
        h.handle
            .deliver(command(CommandKind::StartLogging {
                channel: "#next".into(),
            }))
            .await
            .unwrap();
        wait_until(&h.script, |s| s.sent.len() >= 4).await;

        {
            let script = h.script.lock().unwrap();
            assert_eq!(script.sent[3..], ["JOIN #next"]);
            assert_eq!(script.attempts.len(), 1);
        }
        h.handle.shutdown();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_holds_the_session() {
        let mut h = start_with_queue(network(&["s0:6667"]), Script::default(), true, 1);
        wait_until(&h.script, |s| s.sent.len() >= 3).await;

        for text in ["one", "two", "three"] {
            h.events
                .send(inbound(&format!(":alice!al@a.org PRIVMSG #a :{text}")))
                .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Blocked on the queue, so nothing else gets taken either.
        let join = command(CommandKind::StartLogging {
            channel: "#later".into(),
        });
        let taken = tokio::time::timeout(Duration::from_millis(50), h.handle.deliver(join)).await;
        assert!(taken.is_err());
        assert_eq!(h.script.lock().unwrap().sent.len(), 3);

        let mut texts = Vec::new();
        for _ in 0..3 {
            let record = h.records.recv().await.unwrap();
            texts.push(record.payload.unwrap_or_default());
        }
        assert_eq!(texts, ["one", "two", "three"]);

        h.handle
            .deliver(command(CommandKind::StartLogging {
                channel: "#later".into(),
            }))
            .await
            .unwrap();
        wait_until(&h.script, |s| s.sent.len() >= 4).await;
        assert_eq!(h.script.lock().unwrap().sent[3], "JOIN #later");

        h.handle.shutdown();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_waits_for_connect() {
        let h = start(network(&["s0:6667", "s1:6667"]), Script::default(), true);
        wait_until(&h.script, |s| s.sent.len() >= 3).await;

        h.handle.deliver(command(CommandKind::Disconnect)).await.unwrap();
        wait_until(&h.script, |s| s.sent.len() >= 4).await;
        assert_eq!(h.script.lock().unwrap().sent[3], "QUIT disconnecting...");

        // Taken and dropped while offline.
        h.handle
            .deliver(command(CommandKind::StartLogging {
                channel: "#x".into(),
            }))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        {
            let script = h.script.lock().unwrap();
            assert_eq!(script.attempts.len(), 1);
            assert_eq!(script.sent.len(), 4);
        }

        h.handle.deliver(command(CommandKind::Connect)).await.unwrap();
        wait_until(&h.script, |s| s.attempts.len() >= 2).await;
        // Reconnects to the same server, no rotation.
        assert_eq!(h.script.lock().unwrap().attempts, vec!["s0:6667", "s0:6667"]);

        h.handle.shutdown();
        h.task.await.unwrap();
    }
}
