//! Live-tail dispatcher.
//!
//! A subscriber names a record it has already seen; from then on it is sent
//! every newer record of one network+channel, oldest first, one JSON line
//! each. The cursor is a timestamp watermark that only moves forward. Records
//! sharing the watermark's exact timestamp are not re-sent.

mod server;
pub mod view;

pub use server::TailServer;
pub use view::{LogData, LogView};

use crate::db::LogQuery;
use crate::error::TailError;
use crate::ingest::IngestNotice;
use crate::model::{NetworkId, RecordId};
use crate::store::LogStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Marker sent once the start record has been resolved.
pub const READY_MARKER: &str = "RUNNING";

/// Where a subscription's lines go.
#[async_trait]
pub trait LineSink: Send {
    /// Write one line; the terminator is added by the sink.
    async fn send_line(&mut self, line: &str) -> Result<(), TailError>;

    /// True once the subscriber has gone away.
    fn is_closed(&self) -> bool;
}

/// One subscriber's cursor.
#[derive(Debug, Clone)]
pub struct Subscription {
    network_id: NetworkId,
    channel: String,
    watermark: DateTime<Utc>,
}

impl Subscription {
    /// Resolve the client-supplied start id into a watermark.
    pub async fn start(
        store: &dyn LogStore,
        network_id: NetworkId,
        channel: impl Into<String>,
        start_id: &str,
    ) -> Result<Self, TailError> {
        let id: RecordId = start_id
            .parse()
            .map_err(|_| TailError::BadStart(start_id.to_string()))?;
        let start = store
            .find_record(id)
            .await?
            .ok_or(TailError::UnknownRecord(id))?;

        Ok(Self {
            network_id,
            channel: channel.into(),
            watermark: start.record.timestamp,
        })
    }

    pub fn watermark(&self) -> DateTime<Utc> {
        self.watermark
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    fn wants(&self, notice: &IngestNotice) -> bool {
        notice.network_id == self.network_id && notice.channel == self.channel
    }

    /// Push every record newer than the watermark. Returns how many were sent.
    pub async fn pump<S: LineSink + ?Sized>(
        &mut self,
        store: &dyn LogStore,
        sink: &mut S,
    ) -> Result<usize, TailError> {
        let query = LogQuery::channel(self.network_id, self.channel.clone()).after(self.watermark);
        let records = store.query_records(&query).await?;

        let mut sent = 0;
        for stored in &records {
            if sink.is_closed() {
                return Err(TailError::SinkClosed);
            }
            let line = serde_json::to_string(&LogView::from(stored))?;
            sink.send_line(&line).await?;
            sent += 1;
            if stored.record.timestamp > self.watermark {
                self.watermark = stored.record.timestamp;
            }
        }
        Ok(sent)
    }

    /// Serve the subscription until the sink closes, an error occurs or
    /// `stop` fires. Wakes on every tick and on matching ingest notices.
    pub async fn run<S: LineSink + ?Sized>(
        mut self,
        store: &dyn LogStore,
        sink: &mut S,
        mut notices: broadcast::Receiver<IngestNotice>,
        poll_interval: Duration,
        stop: CancellationToken,
    ) -> Result<(), TailError> {
        let mut ticker = interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut notices_open = true;

        loop {
            tokio::select! {
                _ = stop.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
                notice = notices.recv(), if notices_open => match notice {
                    Ok(notice) if self.wants(&notice) => {}
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Tail notices lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Ingestion stopped, polling only");
                        notices_open = false;
                        continue;
                    }
                },
            }

            if sink.is_closed() {
                return Err(TailError::SinkClosed);
            }
            let sent = self.pump(store, sink).await?;
            if sent > 0 {
                debug!(sent, watermark = %self.watermark, "Tail pushed records");
            }
        }
    }
}
