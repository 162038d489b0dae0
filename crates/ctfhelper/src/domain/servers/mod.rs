mod store;

pub use store::*;

use sqlx::{sqlite::SqliteRow, FromRow, Row};
use crate::infra::db::get_snowflake;

/// Per guild wiring: where CTF channels live and who may manage them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub guild_id: u64,
    pub active_category_id: Option<u64>,
    pub archive_category_id: Option<u64>,
    pub manager_role_id: Option<u64>,
    pub feed_channel_id: Option<u64>,
    /// Team id on the event index.
    pub team_id: Option<i64>,
    pub team_role_id: Option<u64>,
}

impl ServerConfig {
    pub fn new(guild_id: u64) -> Self {
        Self {
            guild_id,
            active_category_id: None,
            archive_category_id: None,
            manager_role_id: None,
            feed_channel_id: None,
            team_id: None,
            team_role_id: None,
        }
    }

    /// Creation needs both a category to put channels in and a role to gate on.
    pub fn is_ready_for_creation(&self) -> bool {
        self.active_category_id.is_some() && self.manager_role_id.is_some()
    }
}

impl FromRow<'_, SqliteRow> for ServerConfig {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let guild_id: i64 = row.try_get("guild_id")?;
        Ok(ServerConfig {
            guild_id: guild_id as u64,
            active_category_id: get_snowflake(row, "active_category_id")?,
            archive_category_id: get_snowflake(row, "archive_category_id")?,
            manager_role_id: get_snowflake(row, "manager_role_id")?,
            feed_channel_id: get_snowflake(row, "feed_channel_id")?,
            team_id: row.try_get("team_id")?,
            team_role_id: get_snowflake(row, "team_role_id")?,
        })
    }
}
