//! Log repository.
//!
//! Stores one row per logged protocol event. Timestamps are kept as UTC
//! nanoseconds so ordering survives the round trip exactly.

use super::DbError;
use crate::model::{LogKind, LogRecord, NetworkId, RecordId, StoredRecord, date_bucket};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

type LogRow = (
    i64,
    i64,
    String,
    String,
    i64,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
);

const LOG_COLUMNS: &str =
    "id, network_id, channel, kind, ts_nanos, split_date, nick, ident, host, target, payload";

/// Filter for [`LogRepository::query`].
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub network_id: NetworkId,
    pub channel: String,
    /// Only records strictly later than this instant.
    pub after: Option<DateTime<Utc>>,
    /// Only records in this `YYYY-MM-DD` bucket.
    pub date: Option<String>,
}

impl LogQuery {
    pub fn channel(network_id: NetworkId, channel: impl Into<String>) -> Self {
        Self {
            network_id,
            channel: channel.into(),
            after: None,
            date: None,
        }
    }

    pub fn after(mut self, ts: DateTime<Utc>) -> Self {
        self.after = Some(ts);
        self
    }

    pub fn on_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }
}

/// Repository for log records.
pub struct LogRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> LogRepository<'a> {
    /// Create a new log repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist a record; the date bucket is derived from its timestamp here.
    pub async fn insert(&self, record: &LogRecord) -> Result<RecordId, DbError> {
        let ts_nanos = to_nanos(&record.timestamp)?;

        let result = sqlx::query(
            r#"
            INSERT INTO logs (network_id, channel, kind, ts_nanos, split_date, nick, ident, host, target, payload)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.network_id.0)
        .bind(&record.channel)
        .bind(record.kind.as_str())
        .bind(ts_nanos)
        .bind(record.date_bucket())
        .bind(&record.nick)
        .bind(&record.ident)
        .bind(&record.host)
        .bind(record.target.as_deref())
        .bind(record.payload.as_deref())
        .execute(self.pool)
        .await?;

        Ok(RecordId(result.last_insert_rowid()))
    }

    /// Find a record by id.
    pub async fn find_by_id(&self, id: RecordId) -> Result<Option<StoredRecord>, DbError> {
        let row = sqlx::query_as::<_, LogRow>(&format!(
            "SELECT {LOG_COLUMNS} FROM logs WHERE id = ?"
        ))
        .bind(id.0)
        .fetch_optional(self.pool)
        .await?;

        row.map(stored_from_row).transpose()
    }

    /// Records matching `query`, oldest first (ties broken by id).
    pub async fn query(&self, query: &LogQuery) -> Result<Vec<StoredRecord>, DbError> {
        let after = query.after.as_ref().map(to_nanos).transpose()?;

        let rows = sqlx::query_as::<_, LogRow>(&format!(
            r#"
            SELECT {LOG_COLUMNS}
            FROM logs
            WHERE network_id = ? AND channel = ?
              AND (? IS NULL OR ts_nanos > ?)
              AND (? IS NULL OR split_date = ?)
            ORDER BY ts_nanos, id
            "#
        ))
        .bind(query.network_id.0)
        .bind(&query.channel)
        .bind(after)
        .bind(after)
        .bind(query.date.as_deref())
        .bind(query.date.as_deref())
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(stored_from_row).collect()
    }

    /// Distinct date buckets that hold records for a channel, ascending.
    pub async fn dates(&self, network_id: NetworkId, channel: &str) -> Result<Vec<String>, DbError> {
        let dates = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT split_date
            FROM logs
            WHERE network_id = ? AND channel = ?
            ORDER BY split_date
            "#,
        )
        .bind(network_id.0)
        .bind(channel)
        .fetch_all(self.pool)
        .await?;
        Ok(dates)
    }

    /// Channels of a network that hold at least one record.
    pub async fn channels(&self, network_id: NetworkId) -> Result<Vec<String>, DbError> {
        let channels = sqlx::query_scalar::<_, String>(
            r#"
            SELECT DISTINCT channel
            FROM logs
            WHERE network_id = ? AND channel != ''
            ORDER BY channel
            "#,
        )
        .bind(network_id.0)
        .fetch_all(self.pool)
        .await?;
        Ok(channels)
    }

    /// Number of records stored for one channel.
    pub async fn channel_count(&self, network_id: NetworkId, channel: &str) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM logs WHERE network_id = ? AND channel = ?",
        )
        .bind(network_id.0)
        .bind(channel)
        .fetch_one(self.pool)
        .await?;
        Ok(count)
    }

    /// Total number of stored records.
    pub async fn count(&self) -> Result<i64, DbError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM logs")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Ids and timestamps of every record, in id order.
    pub async fn timestamps(&self) -> Result<Vec<(RecordId, DateTime<Utc>)>, DbError> {
        let rows = sqlx::query_as::<_, (i64, i64)>("SELECT id, ts_nanos FROM logs ORDER BY id")
            .fetch_all(self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|(id, ts)| (RecordId(id), DateTime::from_timestamp_nanos(ts)))
            .collect())
    }

    /// Overwrite the stored date bucket of one record.
    pub async fn set_date_bucket(&self, id: RecordId, bucket: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE logs SET split_date = ? WHERE id = ?")
            .bind(bucket)
            .bind(id.0)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

fn to_nanos(ts: &DateTime<Utc>) -> Result<i64, DbError> {
    ts.timestamp_nanos_opt()
        .ok_or_else(|| DbError::TimestampOutOfRange(ts.to_rfc3339()))
}

fn stored_from_row(
    (id, network_id, channel, kind, ts_nanos, split_date, nick, ident, host, target, payload): LogRow,
) -> Result<StoredRecord, DbError> {
    let kind = kind.parse::<LogKind>().map_err(|reason| DbError::Corrupt {
        table: "logs",
        reason,
    })?;
    Ok(StoredRecord {
        id: RecordId(id),
        date_bucket: split_date,
        record: LogRecord {
            network_id: NetworkId(network_id),
            channel,
            kind,
            timestamp: DateTime::from_timestamp_nanos(ts_nanos),
            nick,
            ident,
            host,
            target,
            payload,
        },
    })
}

/// Recompute the date bucket of every record. `progress` is called after
/// each record with `(done, total)`.
pub async fn recompute_date_buckets<F>(repo: &LogRepository<'_>, mut progress: F) -> Result<u64, DbError>
where
    F: FnMut(u64, u64),
{
    let records = repo.timestamps().await?;
    let total = records.len() as u64;
    let mut done = 0;
    for (id, ts) in records {
        repo.set_date_bucket(id, &date_bucket(&ts)).await?;
        done += 1;
        progress(done, total);
    }
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::{Duration, TimeZone};

    fn record(channel: &str, ts: DateTime<Utc>, text: &str) -> LogRecord {
        LogRecord {
            network_id: NetworkId(1),
            channel: channel.to_string(),
            kind: LogKind::Message,
            timestamp: ts,
            nick: "alice".into(),
            ident: "al".into(),
            host: "example.org".into(),
            target: None,
            payload: Some(text.to_string()),
        }
    }

    #[tokio::test]
    async fn test_insert_then_query_by_date() {
        let db = Database::new(":memory:").await.unwrap();
        let ts = Utc.with_ymd_and_hms(2013, 7, 4, 12, 0, 0).unwrap() + Duration::nanoseconds(17);
        let rec = record("#rust", ts, "hello");
        let id = db.logs().insert(&rec).await.unwrap();
        db.logs()
            .insert(&record("#rust", ts + Duration::days(1), "tomorrow"))
            .await
            .unwrap();
        db.logs().insert(&record("#other", ts, "elsewhere")).await.unwrap();

        let found = db
            .logs()
            .query(&LogQuery::channel(NetworkId(1), "#rust").on_date("2013-07-04"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, id);
        assert_eq!(found[0].date_bucket, "2013-07-04");
        assert_eq!(found[0].record, rec);

        let dates = db.logs().dates(NetworkId(1), "#rust").await.unwrap();
        assert_eq!(dates, vec!["2013-07-04", "2013-07-05"]);
        assert_eq!(
            db.logs().channels(NetworkId(1)).await.unwrap(),
            vec!["#other", "#rust"]
        );
    }

    #[tokio::test]
    async fn test_query_after_is_strict_and_ordered() {
        let db = Database::new(":memory:").await.unwrap();
        let t1 = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 1).unwrap();
        let t2 = t1 + Duration::seconds(1);
        let t3 = t2 + Duration::seconds(1);
        // Inserted out of order on purpose.
        db.logs().insert(&record("#c", t3, "three")).await.unwrap();
        let first = db.logs().insert(&record("#c", t1, "one")).await.unwrap();
        db.logs().insert(&record("#c", t2, "two")).await.unwrap();

        let start = db.logs().find_by_id(first).await.unwrap().unwrap();
        let later = db
            .logs()
            .query(&LogQuery::channel(NetworkId(1), "#c").after(start.record.timestamp))
            .await
            .unwrap();
        let texts: Vec<_> = later
            .iter()
            .map(|r| r.record.payload.as_deref().unwrap())
            .collect();
        assert_eq!(texts, vec!["two", "three"]);
    }

    #[tokio::test]
    async fn test_recompute_date_buckets() {
        let db = Database::new(":memory:").await.unwrap();
        let ts = Utc.with_ymd_and_hms(2019, 3, 1, 8, 0, 0).unwrap();
        let id = db.logs().insert(&record("#c", ts, "x")).await.unwrap();
        db.logs().set_date_bucket(id, "bogus").await.unwrap();

        let mut calls = Vec::new();
        let done = recompute_date_buckets(&db.logs(), |d, t| calls.push((d, t)))
            .await
            .unwrap();
        assert_eq!(done, 1);
        assert_eq!(calls, vec![(1, 1)]);
        let fixed = db.logs().find_by_id(id).await.unwrap().unwrap();
        assert_eq!(fixed.date_bucket, "2019-03-01");
        assert_eq!(db.logs().count().await.unwrap(), 1);
    }
}
