//! Ingestion pipeline.
//!
//! Single consumer of the bounded record queue shared by every session.
//! Records are persisted in arrival order. A record that cannot be written
//! is logged and dropped, after `persist_retries` extra attempts when
//! configured. Each successful write is announced to live-tail workers.

use crate::config::LoggerSettings;
use crate::metrics;
use crate::model::{LogRecord, NetworkId, RecordId};
use crate::store::LogStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Capacity of the notification fan-out. Slow tail workers that lag behind
/// simply fall back to their poll tick.
pub const NOTICE_CAPACITY: usize = 256;

/// Announcement that a record was persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestNotice {
    pub network_id: NetworkId,
    pub channel: String,
    pub record_id: RecordId,
}

/// The bounded queue between sessions and the pipeline.
pub fn queue(capacity: usize) -> (mpsc::Sender<LogRecord>, mpsc::Receiver<LogRecord>) {
    mpsc::channel(capacity.max(1))
}

pub struct IngestPipeline {
    store: Arc<dyn LogStore>,
    records: mpsc::Receiver<LogRecord>,
    notices: broadcast::Sender<IngestNotice>,
    retries: u32,
    retry_delay: Duration,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn LogStore>,
        records: mpsc::Receiver<LogRecord>,
        notices: broadcast::Sender<IngestNotice>,
        settings: &LoggerSettings,
    ) -> Self {
        Self {
            store,
            records,
            notices,
            retries: settings.persist_retries,
            retry_delay: settings.persist_retry_delay(),
        }
    }

    /// Drain the queue until every producer is gone.
    pub async fn run(mut self) {
        info!(retries = self.retries, "Ingestion pipeline starting");
        while let Some(record) = self.records.recv().await {
            self.ingest(record).await;
        }
        info!("Ingestion queue closed, pipeline stopped");
    }

    /// Persist one record. Returns its id, or `None` if it was dropped.
    pub async fn ingest(&self, record: LogRecord) -> Option<RecordId> {
        let mut attempt = 0;
        loop {
            let start = Instant::now();
            match self.store.persist(&record).await {
                Ok(record_id) => {
                    metrics::record_persisted(
                        &record.network_id.to_string(),
                        start.elapsed().as_secs_f64(),
                    );
                    debug!(record_id = %record_id, kind = %record.kind, channel = %record.channel, "Record persisted");
                    // No subscribers is fine.
                    let _ = self.notices.send(IngestNotice {
                        network_id: record.network_id,
                        channel: record.channel,
                        record_id,
                    });
                    return Some(record_id);
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    warn!(attempt, error = %e, "Persist failed, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    error!(
                        network_id = %record.network_id,
                        channel = %record.channel,
                        kind = %record.kind,
                        error = %e,
                        "Persist failed, dropping record"
                    );
                    metrics::record_dropped("persist_failed");
                    return None;
                }
            }
        }
    }
}
