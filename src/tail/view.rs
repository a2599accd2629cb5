//! JSON view of a stored record, shared by the live tail and the HTTP API.

use crate::model::{LogKind, StoredRecord};
use chrono::SecondsFormat;
use serde::Serialize;

/// One record as clients see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogView {
    pub id: i64,
    /// RFC 3339, UTC.
    pub time: String,
    pub nick: String,
    pub ident: String,
    pub host: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Null for joins.
    pub data: Option<LogData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum LogData {
    Text(String),
    Kick { target: String, message: String },
}

impl From<&StoredRecord> for LogView {
    fn from(stored: &StoredRecord) -> Self {
        let record = &stored.record;
        let data = match record.kind {
            LogKind::Join => None,
            LogKind::Kick => Some(LogData::Kick {
                target: record.target.clone().unwrap_or_default(),
                message: record.payload.clone().unwrap_or_default(),
            }),
            LogKind::Message
            | LogKind::Notice
            | LogKind::Part
            | LogKind::Topic
            | LogKind::Quit => Some(LogData::Text(record.payload.clone().unwrap_or_default())),
        };

        Self {
            id: stored.id.0,
            time: record
                .timestamp
                .to_rfc3339_opts(SecondsFormat::AutoSi, true),
            nick: record.nick.clone(),
            ident: record.ident.clone(),
            host: record.host.clone(),
            kind: record.kind.as_str(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LogRecord, NetworkId, RecordId};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn stored(kind: LogKind, target: Option<&str>, payload: Option<&str>) -> StoredRecord {
        let timestamp = Utc.with_ymd_and_hms(2013, 7, 4, 12, 30, 0).unwrap();
        StoredRecord {
            id: RecordId(42),
            date_bucket: "2013-07-04".into(),
            record: LogRecord {
                network_id: NetworkId(1),
                channel: "#c".into(),
                kind,
                timestamp,
                nick: "A".into(),
                ident: "a".into(),
                host: "h".into(),
                target: target.map(String::from),
                payload: payload.map(String::from),
            },
        }
    }

    #[test]
    fn test_message_view() {
        let view = LogView::from(&stored(LogKind::Message, None, Some("hello")));
        assert_eq!(
            serde_json::to_value(&view).unwrap(),
            json!({
                "id": 42,
                "time": "2013-07-04T12:30:00Z",
                "nick": "A",
                "ident": "a",
                "host": "h",
                "type": "privmsg",
                "data": "hello",
            })
        );
    }

    #[test]
    fn test_kick_and_join_data() {
        let kick = LogView::from(&stored(LogKind::Kick, Some("B"), Some("bye")));
        assert_eq!(
            serde_json::to_value(&kick).unwrap()["data"],
            json!({"target": "B", "message": "bye"})
        );
        let join = LogView::from(&stored(LogKind::Join, None, None));
        assert_eq!(serde_json::to_value(&join).unwrap()["data"], json!(null));
    }
}
