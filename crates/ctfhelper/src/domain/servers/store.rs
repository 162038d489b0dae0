use log::debug;
use time::OffsetDateTime;

use crate::infra::db::{format_datetime, snowflake_param, DBConnection};

use super::ServerConfig;

#[derive(Debug, Clone)]
pub struct ServerStore {
    db_connection: DBConnection,
}

impl ServerStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn get(&self, guild_id: u64) -> Result<Option<ServerConfig>, sqlx::Error> {
        sqlx::query_as::<_, ServerConfig>(
            "SELECT guild_id,
                    active_category_id,
                    archive_category_id,
                    manager_role_id,
                    feed_channel_id,
                    team_id,
                    team_role_id
             FROM servers WHERE guild_id = ?",
        )
        .bind(guild_id as i64)
        .fetch_optional(self.db_connection.read())
        .await
    }

    /// Inserts the config, replacing whatever the guild had before.
    pub async fn upsert(&self, config: ServerConfig) -> Result<ServerConfig, sqlx::Error> {
        let now = format_datetime(OffsetDateTime::now_utc());
        debug!("storing server config for guild {}", config.guild_id);
        let stored = config.clone();

        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query(
                    "INSERT INTO servers (
                        guild_id,
                        active_category_id,
                        archive_category_id,
                        manager_role_id,
                        feed_channel_id,
                        team_id,
                        team_role_id,
                        created_at,
                        updated_at
                    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT (guild_id) DO UPDATE SET
                        active_category_id = excluded.active_category_id,
                        archive_category_id = excluded.archive_category_id,
                        manager_role_id = excluded.manager_role_id,
                        feed_channel_id = excluded.feed_channel_id,
                        team_id = excluded.team_id,
                        team_role_id = excluded.team_role_id,
                        updated_at = excluded.updated_at",
                )
                .bind(config.guild_id as i64)
                .bind(snowflake_param(config.active_category_id))
                .bind(snowflake_param(config.archive_category_id))
                .bind(snowflake_param(config.manager_role_id))
                .bind(snowflake_param(config.feed_channel_id))
                .bind(config.team_id)
                .bind(snowflake_param(config.team_role_id))
                .bind(&now)
                .bind(&now)
                .execute(&pool)
                .await?;
                Ok(())
            })
            .await?;

        Ok(stored)
    }

    /// Returns whether a row was removed.
    pub async fn delete(&self, guild_id: u64) -> Result<bool, sqlx::Error> {
        self.db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query("DELETE FROM servers WHERE guild_id = ?")
                    .bind(guild_id as i64)
                    .execute(&pool)
                    .await?;
                Ok(result.rows_affected() > 0)
            })
            .await
    }
}
