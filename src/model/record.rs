//! The normalized log record.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Storage-assigned identifier of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(RecordId)
    }
}

/// Which protocol event a record was made from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    Message,
    Notice,
    Join,
    Part,
    Topic,
    Kick,
    Quit,
}

impl LogKind {
    /// Stable lowercase name used in storage and in JSON output.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Message => "privmsg",
            LogKind::Notice => "notice",
            LogKind::Join => "join",
            LogKind::Part => "part",
            LogKind::Topic => "topic",
            LogKind::Kick => "kick",
            LogKind::Quit => "quit",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "privmsg" => LogKind::Message,
            "notice" => LogKind::Notice,
            "join" => LogKind::Join,
            "part" => LogKind::Part,
            "topic" => LogKind::Topic,
            "kick" => LogKind::Kick,
            "quit" => LogKind::Quit,
            other => return Err(format!("unknown log kind: {other}")),
        })
    }
}

/// One protocol event, normalized. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub network_id: super::NetworkId,
    /// Empty for connection-scoped events (QUIT).
    pub channel: String,
    pub kind: LogKind,
    pub timestamp: DateTime<Utc>,
    pub nick: String,
    pub ident: String,
    pub host: String,
    /// The kicked user for KICK; unset otherwise.
    pub target: Option<String>,
    pub payload: Option<String>,
}

impl LogRecord {
    /// Calendar day of the record, used for date-range queries.
    pub fn date_bucket(&self) -> String {
        date_bucket(&self.timestamp)
    }
}

/// `YYYY-MM-DD` of a timestamp (UTC).
pub fn date_bucket(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d").to_string()
}

/// A record as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub id: RecordId,
    pub date_bucket: String,
    pub record: LogRecord,
}
