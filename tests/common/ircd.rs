//! Fake IRC server.
//!
//! Accepts the logger's connections, completes registration with a bare
//! RPL_WELCOME and lets the test script both directions of the conversation.

use irclog_proto::Message;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

pub struct FakeIrcd {
    listener: TcpListener,
}

impl FakeIrcd {
    pub async fn bind() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    /// `host:port` as the logger expects it in a server list.
    pub fn address(&self) -> String {
        match self.listener.local_addr() {
            Ok(addr) => addr.to_string(),
            Err(_) => String::new(),
        }
    }

    /// Accept the next connection and welcome it.
    pub async fn accept(&self) -> anyhow::Result<FakeConnection> {
        let (stream, _) = timeout(Duration::from_secs(5), self.listener.accept()).await??;
        let (read_half, write_half) = stream.into_split();
        let mut conn = FakeConnection {
            reader: BufReader::new(read_half),
            writer: write_half,
            nick: String::new(),
        };

        let mut saw_user = false;
        while conn.nick.is_empty() || !saw_user {
            let msg = conn.recv().await?;
            match msg.command.name().as_str() {
                "NICK" => {
                    conn.nick = msg.command.params().first().map(|s| s.to_string()).unwrap_or_default();
                }
                "USER" => saw_user = true,
                _ => {}
            }
        }
        let welcome = format!(":fake.server 001 {} :Welcome", conn.nick);
        conn.send_raw(&welcome).await?;
        Ok(conn)
    }
}

pub struct FakeConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    nick: String,
}

impl FakeConnection {
    #[allow(dead_code)]
    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Next message from the logger.
    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        let mut line = String::new();
        let read = timeout(Duration::from_secs(5), self.reader.read_line(&mut line)).await??;
        if read == 0 {
            anyhow::bail!("connection closed");
        }
        line.trim_end()
            .parse::<Message>()
            .map_err(|e| anyhow::anyhow!("parse error: {e}"))
    }

    /// Skip messages until one with the given command arrives.
    pub async fn expect(&mut self, command: &str) -> anyhow::Result<Message> {
        loop {
            let msg = self.recv().await?;
            if msg.command.name() == command {
                return Ok(msg);
            }
        }
    }
}
