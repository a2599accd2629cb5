//! Storage collaborator contracts.
//!
//! The router, ingestion pipeline and live-tail workers only see these
//! traits; [`Database`] implements both.

use crate::db::{Database, DbError, LogQuery};
use crate::model::{CommandId, ControlCommand, LogRecord, NetworkId, RecordId, StoredRecord};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Source of out-of-band control commands.
#[async_trait]
pub trait CommandQueue: Send + Sync {
    /// Every command not yet complete, in queue order.
    async fn fetch_pending(&self) -> Result<Vec<ControlCommand>, StoreError>;

    /// Record that a session has taken the command.
    async fn mark_complete(&self, id: CommandId) -> Result<(), StoreError>;
}

/// Durable log of records.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn persist(&self, record: &LogRecord) -> Result<RecordId, StoreError>;

    async fn find_record(&self, id: RecordId) -> Result<Option<StoredRecord>, StoreError>;

    /// Records matching the query, sorted by timestamp ascending.
    async fn query_records(&self, query: &LogQuery) -> Result<Vec<StoredRecord>, StoreError>;

    /// Whether the channel has ever logged anything.
    async fn has_records(&self, network_id: NetworkId, channel: &str) -> Result<bool, StoreError> {
        let query = LogQuery::channel(network_id, channel);
        Ok(!self.query_records(&query).await?.is_empty())
    }
}

#[async_trait]
impl CommandQueue for Database {
    async fn fetch_pending(&self) -> Result<Vec<ControlCommand>, StoreError> {
        Ok(self.commands().fetch_pending().await?)
    }

    async fn mark_complete(&self, id: CommandId) -> Result<(), StoreError> {
        Ok(self.commands().mark_complete(id).await?)
    }
}

#[async_trait]
impl LogStore for Database {
    async fn persist(&self, record: &LogRecord) -> Result<RecordId, StoreError> {
        Ok(self.logs().insert(record).await?)
    }

    async fn find_record(&self, id: RecordId) -> Result<Option<StoredRecord>, StoreError> {
        Ok(self.logs().find_by_id(id).await?)
    }

    async fn query_records(&self, query: &LogQuery) -> Result<Vec<StoredRecord>, StoreError> {
        Ok(self.logs().query(query).await?)
    }

    async fn has_records(&self, network_id: NetworkId, channel: &str) -> Result<bool, StoreError> {
        Ok(self.logs().channel_count(network_id, channel).await? > 0)
    }
}
