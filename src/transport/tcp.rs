//! TCP/TLS transport.

use super::{InboundEvent, IrcStream, Registration, ServerAddr, Transport};
use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use irclog_proto::{Command, LineCodec, Message, ProtocolError};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::{debug, warn};

const RPL_WELCOME: u16 = 1;
const ERR_NICKNAMEINUSE: u16 = 433;

type IrcFramed = Framed<IrcStream, LineCodec>;

/// Plain TCP or TLS connection to an IRC server.
///
/// PING is answered here and never surfaces as an event.
pub struct TcpTransport {
    connect_timeout: Duration,
    registration_timeout: Duration,
    framed: Option<IrcFramed>,
}

impl TcpTransport {
    pub fn new(connect_timeout: Duration, registration_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            registration_timeout,
            framed: None,
        }
    }

    /// Upgrade a TCP stream to TLS, verifying against the platform roots.
    async fn upgrade_to_tls(
        tcp_stream: TcpStream,
        hostname: &str,
    ) -> Result<tokio_rustls::client::TlsStream<TcpStream>, TransportError> {
        use tokio_rustls::TlsConnector;
        use tokio_rustls::rustls::pki_types::ServerName;
        use tokio_rustls::rustls::{ClientConfig, RootCertStore};

        let tls_err = |reason: String| TransportError::Tls {
            server: hostname.to_string(),
            reason,
        };

        let mut roots = RootCertStore::empty();
        let certs = rustls_native_certs::load_native_certs();
        for cert in certs.certs {
            if let Err(e) = roots.add(cert) {
                warn!(error = %e, "Failed to add root cert");
            }
        }
        for e in &certs.errors {
            warn!(error = %e, "Error loading native certs");
        }

        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        let connector = TlsConnector::from(Arc::new(config));
        let server_name =
            ServerName::try_from(hostname.to_string()).map_err(|e| tls_err(e.to_string()))?;

        connector
            .connect(server_name, tcp_stream)
            .await
            .map_err(|e| tls_err(e.to_string()))
    }

    async fn open(&self, addr: &ServerAddr) -> Result<IrcStream, TransportError> {
        let server = addr.to_string();
        let tcp = match timeout(
            self.connect_timeout,
            TcpStream::connect((addr.host.as_str(), addr.port)),
        )
        .await
        {
            Ok(Ok(tcp)) => tcp,
            Ok(Err(source)) => return Err(TransportError::Connect { server, source }),
            Err(_) => return Err(TransportError::ConnectTimeout(server)),
        };

        if addr.tls {
            let tls = match timeout(self.connect_timeout, Self::upgrade_to_tls(tcp, &addr.host))
                .await
            {
                Ok(result) => result?,
                Err(_) => return Err(TransportError::ConnectTimeout(server)),
            };
            Ok(IrcStream::Tls(Box::new(tls)))
        } else {
            Ok(IrcStream::Plain(tcp))
        }
    }

    /// Send NICK/USER and wait for RPL_WELCOME, retrying the nick with a
    /// trailing underscore while it is taken.
    async fn register(
        framed: &mut IrcFramed,
        registration: &Registration,
    ) -> Result<String, TransportError> {
        let mut nick = registration.nick.clone();
        framed.send(Message::from(Command::NICK(nick.clone())).to_string()).await?;
        framed
            .send(
                Message::from(Command::USER(
                    registration.user.clone(),
                    "0".to_string(),
                    registration.realname.clone(),
                ))
                .to_string(),
            )
            .await?;

        while let Some(line) = framed.next().await {
            let line = line?;
            let msg = match line.parse::<Message>() {
                Ok(msg) => msg,
                Err(e) => {
                    debug!(error = %e, line = %line, "Ignoring unparsable line during registration");
                    continue;
                }
            };
            match msg.command {
                Command::PING(server, _) => {
                    framed
                        .send(Message::from(Command::PONG(server, None)).to_string())
                        .await?;
                }
                Command::Response(RPL_WELCOME, params) => {
                    return Ok(params.into_iter().next().unwrap_or(nick));
                }
                Command::Response(ERR_NICKNAMEINUSE, _) => {
                    nick.push('_');
                    debug!(nick = %nick, "Nick in use, retrying");
                    framed.send(Message::from(Command::NICK(nick.clone())).to_string()).await?;
                }
                Command::ERROR(reason) => return Err(TransportError::Rejected(reason)),
                _ => {}
            }
        }
        Err(TransportError::Closed)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(
        &mut self,
        server: &str,
        registration: &Registration,
    ) -> Result<String, TransportError> {
        self.disconnect().await;

        let addr: ServerAddr = server.parse()?;
        let stream = self.open(&addr).await?;
        debug!(server = %addr, tls = stream.is_tls(), "Connected, registering");
        let mut framed = Framed::new(stream, LineCodec::new());

        let nick = match timeout(
            self.registration_timeout,
            Self::register(&mut framed, registration),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(TransportError::RegistrationTimeout(addr.to_string())),
        };

        self.framed = Some(framed);
        Ok(nick)
    }

    async fn send(&mut self, message: Message) -> Result<(), TransportError> {
        let framed = self.framed.as_mut().ok_or(TransportError::NotConnected)?;
        match framed.send(message.to_string()).await {
            Ok(()) => Ok(()),
            // Rejected before anything was written; the connection is fine.
            Err(e @ ProtocolError::EmbeddedLineBreak) => Err(e.into()),
            Err(e) => {
                self.framed = None;
                Err(e.into())
            }
        }
    }

    async fn next_event(&mut self) -> Option<InboundEvent> {
        loop {
            let framed = self.framed.as_mut()?;
            // A PONG from a cancelled call may still be buffered.
            if let Err(e) = SinkExt::<String>::flush(framed).await {
                warn!(error = %e, "Flush failed, dropping connection");
                self.framed = None;
                return None;
            }
            let line = match framed.next().await {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!(error = %e, "Read error, dropping connection");
                    self.framed = None;
                    return None;
                }
                None => {
                    self.framed = None;
                    return None;
                }
            };

            let message = match line.parse::<Message>() {
                Ok(message) => message,
                Err(e) => {
                    debug!(error = %e, line = %line, "Ignoring unparsable line");
                    continue;
                }
            };

            if let Command::PING(server, _) = &message.command {
                let pong = Message::from(Command::PONG(server.clone(), None));
                if let Err(e) = framed.send(pong.to_string()).await {
                    warn!(error = %e, "Failed to answer PING");
                    self.framed = None;
                    return None;
                }
                continue;
            }

            return Some(InboundEvent::now(message));
        }
    }

    async fn disconnect(&mut self) {
        if let Some(mut framed) = self.framed.take() {
            let _ = framed.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    fn registration() -> Registration {
        Registration {
            nick: "logbot".into(),
            user: "logbot".into(),
            realname: "http://irclogs.me".into(),
        }
    }

    #[tokio::test]
    async fn test_registration_retries_taken_nick_and_answers_ping() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let (read, mut write) = sock.into_split();
            let mut lines = BufReader::new(read).lines();

            assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK logbot");
            assert!(lines.next_line().await.unwrap().unwrap().starts_with("USER logbot 0 *"));
            write.write_all(b":srv 433 * logbot :Nickname is already in use\r\n").await.unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "NICK logbot_");
            write.write_all(b":srv 001 logbot_ :Welcome\r\n").await.unwrap();
            write.write_all(b"PING :srv\r\n").await.unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "PONG srv");
            write
                .write_all(b":alice!al@host PRIVMSG #rust :hi\r\n")
                .await
                .unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "JOIN #rust");
        });

        let mut transport = TcpTransport::new(Duration::from_secs(5), Duration::from_secs(5));
        let nick = transport
            .connect(&addr.to_string(), &registration())
            .await
            .unwrap();
        assert_eq!(nick, "logbot_");

        let event = transport.next_event().await.unwrap();
        assert_eq!(event.message.source_nickname(), Some("alice"));
        transport.send(Message::join("#rust")).await.unwrap();

        server.await.unwrap();
        assert!(transport.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_buffered_writes_go_out_before_the_next_read() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            let (read, mut write) = sock.into_split();
            let mut lines = BufReader::new(read).lines();

            lines.next_line().await.unwrap();
            lines.next_line().await.unwrap();
            write.write_all(b":srv 001 logbot :Welcome\r\n").await.unwrap();
            write.write_all(b"PING :srv\r\n").await.unwrap();
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "PONG srv");
            // Nothing more is sent until the buffered line arrives.
            assert_eq!(lines.next_line().await.unwrap().unwrap(), "PONG srv2");
            write
                .write_all(b":alice!al@host PRIVMSG #rust :hi\r\n")
                .await
                .unwrap();
        });

        let mut transport = TcpTransport::new(Duration::from_secs(5), Duration::from_secs(5));
        transport
            .connect(&addr.to_string(), &registration())
            .await
            .unwrap();

        // Answers the PING, then is cancelled while waiting for more.
        assert!(
            timeout(Duration::from_millis(100), transport.next_event())
                .await
                .is_err()
        );

        // Left in the write buffer, as a PONG interrupted mid-flush would be.
        transport
            .framed
            .as_mut()
            .unwrap()
            .feed("PONG srv2".to_string())
            .await
            .unwrap();

        let event = timeout(Duration::from_secs(5), transport.next_event())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.message.source_nickname(), Some("alice"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused_is_an_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut transport = TcpTransport::new(Duration::from_secs(2), Duration::from_secs(2));
        let err = transport
            .connect(&addr.to_string(), &registration())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connect { .. } | TransportError::ConnectTimeout(_)
        ));
        assert!(matches!(
            transport.send(Message::join("#x")).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_registration_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(sock);
        });

        let mut transport = TcpTransport::new(Duration::from_secs(2), Duration::from_millis(100));
        let err = transport
            .connect(&addr.to_string(), &registration())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::RegistrationTimeout(_)));
    }
}
