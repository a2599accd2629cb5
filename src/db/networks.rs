//! Network repository.
//!
//! Networks are the logger's configuration: the core loads them once at
//! startup and treats them as read-only afterwards.

use super::DbError;
use crate::config::NetworkSeed;
use crate::model::{LoggerConfig, NetworkConfig, NetworkId};
use sqlx::SqlitePool;
use std::collections::BTreeSet;

/// Repository for network configuration.
pub struct NetworkRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NetworkRepository<'a> {
    /// Create a new network repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Load the logger configuration. Fails with [`DbError::NoConfig`] when
    /// no network is stored.
    pub async fn load_config(&self) -> Result<LoggerConfig, DbError> {
        let networks = self.list().await?;
        if networks.is_empty() {
            return Err(DbError::NoConfig);
        }
        Ok(LoggerConfig { networks })
    }

    /// All stored networks, ordered by id.
    pub async fn list(&self) -> Result<Vec<NetworkConfig>, DbError> {
        let rows = sqlx::query_as::<_, (i64, String, String, String, String, bool)>(
            r#"
            SELECT id, name, nick, user, realname, enabled
            FROM networks
            ORDER BY id
            "#,
        )
        .fetch_all(self.pool)
        .await?;

        let mut networks = Vec::with_capacity(rows.len());
        for row in rows {
            networks.push(self.hydrate(row).await?);
        }
        Ok(networks)
    }

    /// Find a network by its display name.
    pub async fn find_by_name(&self, name: &str) -> Result<Option<NetworkConfig>, DbError> {
        let row = sqlx::query_as::<_, (i64, String, String, String, String, bool)>(
            r#"
            SELECT id, name, nick, user, realname, enabled
            FROM networks
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Insert a network declared in the config file unless one with the same
    /// name already exists. Returns the id and whether a row was inserted.
    pub async fn seed(
        &self,
        seed: &NetworkSeed,
        default_realname: &str,
    ) -> Result<(NetworkId, bool), DbError> {
        if let Some(existing) = self.find_by_name(&seed.name).await? {
            return Ok((existing.id, false));
        }

        let user = seed.user.as_deref().unwrap_or(&seed.nick);
        let realname = seed.realname.as_deref().unwrap_or(default_realname);

        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO networks (name, nick, user, realname, enabled)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&seed.name)
        .bind(&seed.nick)
        .bind(user)
        .bind(realname)
        .bind(seed.enabled)
        .execute(&mut *tx)
        .await?;
        let network_id = result.last_insert_rowid();

        for (position, address) in seed.servers.iter().enumerate() {
            sqlx::query(
                "INSERT INTO network_servers (network_id, position, address) VALUES (?, ?, ?)",
            )
            .bind(network_id)
            .bind(position as i64)
            .bind(address)
            .execute(&mut *tx)
            .await?;
        }

        let channels: BTreeSet<&str> = seed.channels.iter().map(String::as_str).collect();
        for channel in channels {
            sqlx::query("INSERT INTO network_channels (network_id, name) VALUES (?, ?)")
                .bind(network_id)
                .bind(channel)
                .execute(&mut *tx)
                .await?;
        }

        for (position, line) in seed.post_connect.iter().enumerate() {
            sqlx::query(
                "INSERT INTO network_post_connect (network_id, position, line) VALUES (?, ?, ?)",
            )
            .bind(network_id)
            .bind(position as i64)
            .bind(line)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok((NetworkId(network_id), true))
    }

    async fn hydrate(
        &self,
        (id, name, nick, user, realname, enabled): (i64, String, String, String, String, bool),
    ) -> Result<NetworkConfig, DbError> {
        let servers = sqlx::query_scalar::<_, String>(
            "SELECT address FROM network_servers WHERE network_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        let channels = sqlx::query_scalar::<_, String>(
            "SELECT name FROM network_channels WHERE network_id = ?",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .collect();

        let post_connect = sqlx::query_scalar::<_, String>(
            "SELECT line FROM network_post_connect WHERE network_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(NetworkConfig {
            id: NetworkId(id),
            name,
            nick,
            user,
            realname,
            servers,
            channels,
            post_connect,
            enabled,
        })
    }
}
