//! Command queue repository.
//!
//! External producers insert rows; the router drains the pending ones and
//! marks each complete once a session has taken it.

use super::DbError;
use crate::model::{CommandId, CommandKind, ControlCommand, NetworkId};
use sqlx::SqlitePool;
use tracing::warn;

/// Repository for queued control commands.
pub struct CommandRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> CommandRepository<'a> {
    /// Create a new command repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Queue a command for a network.
    pub async fn enqueue(
        &self,
        network_id: NetworkId,
        kind: &CommandKind,
    ) -> Result<CommandId, DbError> {
        let (channel, target, message) = kind.columns();
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO command_queue (network_id, kind, channel, target, message, complete, created_at)
            VALUES (?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(network_id.0)
        .bind(kind.name())
        .bind(channel)
        .bind(target)
        .bind(message)
        .bind(now)
        .execute(self.pool)
        .await?;

        Ok(CommandId(result.last_insert_rowid()))
    }

    /// Commands not yet marked complete, oldest first.
    ///
    /// Rows whose kind is not understood are logged and skipped; they stay
    /// pending so a newer build can pick them up.
    pub async fn fetch_pending(&self) -> Result<Vec<ControlCommand>, DbError> {
        let rows = sqlx::query_as::<_, (i64, i64, String, String, String, String)>(
            r#"
            SELECT id, network_id, kind, channel, target, message
            FROM command_queue
            WHERE complete = 0
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        let mut commands = Vec::with_capacity(rows.len());
        for (id, network_id, kind, channel, target, message) in rows {
            match CommandKind::from_parts(&kind, channel, target, message) {
                Ok(kind) => commands.push(ControlCommand {
                    id: CommandId(id),
                    network_id: NetworkId(network_id),
                    kind,
                    complete: false,
                }),
                Err(e) => warn!(command_id = id, error = %e, "Skipping queued command"),
            }
        }
        Ok(commands)
    }

    /// Mark a command delivered. Idempotent.
    pub async fn mark_complete(&self, id: CommandId) -> Result<(), DbError> {
        sqlx::query("UPDATE command_queue SET complete = 1 WHERE id = ?")
            .bind(id.0)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Look up a single command, complete or not.
    pub async fn find(&self, id: CommandId) -> Result<Option<ControlCommand>, DbError> {
        let row = sqlx::query_as::<_, (i64, i64, String, String, String, String, bool)>(
            r#"
            SELECT id, network_id, kind, channel, target, message, complete
            FROM command_queue
            WHERE id = ?
            "#,
        )
        .bind(id.0)
        .fetch_optional(self.pool)
        .await?;

        let Some((id, network_id, kind, channel, target, message, complete)) = row else {
            return Ok(None);
        };
        let kind = CommandKind::from_parts(&kind, channel, target, message).map_err(|e| {
            DbError::Corrupt {
                table: "command_queue",
                reason: e.to_string(),
            }
        })?;
        Ok(Some(ControlCommand {
            id: CommandId(id),
            network_id: NetworkId(network_id),
            kind,
            complete,
        }))
    }
}
