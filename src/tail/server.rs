//! WebSocket gateway for live tailing.
//!
//! Clients connect to `/api/{network}/{channel}/ws` (channel without its
//! leading `#`), send the id of the last record they already have, receive
//! the ready marker, then one JSON line per newer record.

use super::{LineSink, READY_MARKER, Subscription};
use crate::error::TailError;
use crate::ingest::IngestNotice;
use crate::metrics::TailSubscriberGuard;
use crate::model::{LoggerConfig, NetworkId};
use crate::store::LogStore;
use crate::telemetry::spans;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use irclog_proto::CHANNEL_PREFIX;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

type Ws = WebSocketStream<TcpStream>;

/// A validated tail target taken from the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
struct TailTarget {
    network_id: NetworkId,
    network: String,
    channel: String,
}

struct TailContext {
    store: Arc<dyn LogStore>,
    networks: Arc<LoggerConfig>,
    notices: broadcast::Sender<IngestNotice>,
    poll_interval: Duration,
}

/// Accept loop for tail subscribers.
pub struct TailServer {
    listener: TcpListener,
    context: Arc<TailContext>,
}

impl TailServer {
    pub async fn bind(
        address: SocketAddr,
        store: Arc<dyn LogStore>,
        networks: Arc<LoggerConfig>,
        notices: broadcast::Sender<IngestNotice>,
        poll_interval: Duration,
    ) -> std::io::Result<Self> {
        let listener = TcpListener::bind(address).await?;
        Ok(Self {
            listener,
            context: Arc::new(TailContext {
                store,
                networks,
                notices,
                poll_interval,
            }),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept subscribers until `shutdown` fires; live subscriptions end with it.
    pub async fn run(self, shutdown: CancellationToken) {
        match self.listener.local_addr() {
            Ok(addr) => info!(%addr, "Live-tail listener started"),
            Err(e) => warn!(error = %e, "Live-tail listener started on unknown address"),
        }

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "Tail connection attempt");
                    let context = Arc::clone(&self.context);
                    let stop = shutdown.child_token();
                    tokio::spawn(async move {
                        if let Err(e) = serve(stream, peer, context, stop).await {
                            debug!(%peer, code = e.error_code(), error = %e, "Tail connection ended");
                        }
                    });
                }
                Err(e) => error!(error = %e, "Failed to accept tail connection"),
            }
        }
        info!("Live-tail listener stopped");
    }
}

/// Map `/api/{network}/{channel}/ws` onto a configured channel.
fn resolve(networks: &LoggerConfig, path: &str) -> Option<TailTarget> {
    let mut segments = path.trim_start_matches('/').split('/');
    let (Some("api"), Some(network), Some(channel), Some("ws"), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };
    if channel.is_empty() {
        return None;
    }

    let config = networks.by_name(network)?;
    let channel = format!("{CHANNEL_PREFIX}{channel}");
    config.channels.contains(&channel).then(|| TailTarget {
        network_id: config.id,
        network: config.name.clone(),
        channel,
    })
}

fn not_found() -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(r#"{"error":"not found"}"#.to_string()));
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

async fn serve(
    stream: TcpStream,
    peer: SocketAddr,
    context: Arc<TailContext>,
    stop: CancellationToken,
) -> Result<(), TailError> {
    let mut target = None;
    let callback = |request: &Request, response: Response| {
        match resolve(&context.networks, request.uri().path()) {
            Some(resolved) => {
                target = Some(resolved);
                Ok(response)
            }
            None => Err(not_found()),
        }
    };

    let ws = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!(%peer, error = %e, "Tail handshake rejected");
            return Ok(());
        }
    };
    let Some(target) = target else {
        return Ok(());
    };

    let span = spans::tail(&peer.to_string(), &target.network, &target.channel);
    subscribe(ws, target, context, stop).instrument(span).await
}

async fn subscribe(
    ws: Ws,
    target: TailTarget,
    context: Arc<TailContext>,
    stop: CancellationToken,
) -> Result<(), TailError> {
    let (write, mut read) = ws.split();
    let mut sink = WsSink {
        write,
        gone: stop.clone(),
    };

    if !context
        .store
        .has_records(target.network_id, &target.channel)
        .await?
    {
        info!("Channel has no records, closing");
        sink.close().await;
        return Ok(());
    }

    let Some(start_id) = first_text(&mut read).await else {
        debug!("Subscriber left before naming a start record");
        return Ok(());
    };
    // Subscribe before resolving so nothing persisted meanwhile is missed.
    let notices = context.notices.subscribe();
    let subscription = match Subscription::start(
        context.store.as_ref(),
        target.network_id,
        target.channel.clone(),
        &start_id,
    )
    .await
    {
        Ok(subscription) => subscription,
        Err(e) => {
            warn!(error = %e, "Cannot resolve start record");
            sink.close().await;
            return Err(e);
        }
    };

    sink.send_line(READY_MARKER).await?;
    info!(watermark = %subscription.watermark(), "Subscriber attached");

    let watcher = tokio::spawn(watch_client(read, stop.clone()));
    let _guard = TailSubscriberGuard::new();
    let result = subscription
        .run(
            context.store.as_ref(),
            &mut sink,
            notices,
            context.poll_interval,
            stop.clone(),
        )
        .await;

    stop.cancel();
    watcher.abort();
    sink.close().await;
    info!("Subscriber detached");
    result
}

/// First text frame from the client, trimmed.
async fn first_text(read: &mut SplitStream<Ws>) -> Option<String> {
    while let Some(frame) = read.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => return Some(text.trim().to_string()),
            Ok(WsMessage::Binary(bytes)) => {
                return Some(String::from_utf8_lossy(&bytes).trim().to_string());
            }
            Ok(WsMessage::Close(_)) | Err(_) => return None,
            Ok(_) => {}
        }
    }
    None
}

/// Cancels `gone` once the client closes its side.
async fn watch_client(mut read: SplitStream<Ws>, gone: CancellationToken) {
    while let Some(frame) = read.next().await {
        if matches!(frame, Ok(WsMessage::Close(_)) | Err(_)) {
            break;
        }
    }
    gone.cancel();
}

struct WsSink {
    write: SplitSink<Ws, WsMessage>,
    gone: CancellationToken,
}

impl WsSink {
    async fn close(&mut self) {
        let _ = self.write.send(WsMessage::Close(None)).await;
    }
}

#[async_trait]
impl LineSink for WsSink {
    async fn send_line(&mut self, line: &str) -> Result<(), TailError> {
        let frame = WsMessage::Text(format!("{line}\n"));
        self.write.send(frame).await.map_err(|e| {
            self.gone.cancel();
            TailError::Sink(e.to_string())
        })
    }

    fn is_closed(&self) -> bool {
        self.gone.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::{LogKind, LogRecord, NetworkConfig};
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Error as WsError;

    fn networks() -> LoggerConfig {
        LoggerConfig {
            networks: vec![NetworkConfig {
                id: NetworkId(1),
                name: "net".into(),
                nick: "logbot".into(),
                user: "logbot".into(),
                realname: "logbot".into(),
                servers: vec!["127.0.0.1:6667".into()],
                channels: BTreeSet::from(["#c".to_string(), "#empty".to_string()]),
                post_connect: vec![],
                enabled: true,
            }],
        }
    }

    fn record(secs: i64, text: &str) -> LogRecord {
        LogRecord {
            network_id: NetworkId(1),
            channel: "#c".into(),
            kind: LogKind::Message,
            timestamp: Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap()
                + chrono::Duration::seconds(secs),
            nick: "alice".into(),
            ident: "al".into(),
            host: "h".into(),
            target: None,
            payload: Some(text.into()),
        }
    }

    async fn server(db: &Database) -> (SocketAddr, broadcast::Sender<IngestNotice>, CancellationToken) {
        let (notices, _) = broadcast::channel(16);
        let server = TailServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(db.clone()),
            Arc::new(networks()),
            notices.clone(),
            Duration::from_millis(20),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        tokio::spawn(server.run(shutdown.clone()));
        (addr, notices, shutdown)
    }

    #[test]
    fn test_resolve_paths() {
        let networks = networks();
        let target = resolve(&networks, "/api/net/c/ws").unwrap();
        assert_eq!(target.network_id, NetworkId(1));
        assert_eq!(target.channel, "#c");

        assert!(resolve(&networks, "/api/net/unlisted/ws").is_none());
        assert!(resolve(&networks, "/api/other/c/ws").is_none());
        assert!(resolve(&networks, "/api/net/c").is_none());
        assert!(resolve(&networks, "/api/net/c/ws/extra").is_none());
    }

    #[tokio::test]
    async fn test_unknown_channel_is_404() {
        let db = Database::new(":memory:").await.unwrap();
        let (addr, _notices, shutdown) = server(&db).await;

        let err = connect_async(format!("ws://{addr}/api/net/nope/ws"))
            .await
            .unwrap_err();
        match err {
            WsError::Http(response) => assert_eq!(response.status(), StatusCode::NOT_FOUND),
            other => panic!("unexpected error: {other}"),
        }
        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_tail_streams_newer_records() {
        let db = Database::new(":memory:").await.unwrap();
        let start = db.logs().insert(&record(0, "old")).await.unwrap();
        let (addr, _notices, shutdown) = server(&db).await;

        let (mut ws, _) = connect_async(format!("ws://{addr}/api/net/c/ws"))
            .await
            .unwrap();
        ws.send(WsMessage::Text(start.to_string())).await.unwrap();

        let ready = ws.next().await.unwrap().unwrap();
        assert_eq!(ready, WsMessage::Text("RUNNING\n".into()));

        let newer = db.logs().insert(&record(5, "fresh")).await.unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = frame.into_text().unwrap();
        assert!(text.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(value["id"], newer.0);
        assert_eq!(value["data"], "fresh");
        assert_eq!(value["type"], "privmsg");

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_channel_without_records_is_closed() {
        let db = Database::new(":memory:").await.unwrap();
        let (addr, _notices, shutdown) = server(&db).await;

        let (mut ws, _) = connect_async(format!("ws://{addr}/api/net/empty/ws"))
            .await
            .unwrap();
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .unwrap();
        assert!(matches!(frame, Some(Ok(WsMessage::Close(_))) | None));
        shutdown.cancel();
    }
}
