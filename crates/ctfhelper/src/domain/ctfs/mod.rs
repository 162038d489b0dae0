mod engine;
mod states;
mod store;

pub use engine::*;
pub use states::*;
pub use store::*;

use secrecy::SecretString;
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use time::{Duration, OffsetDateTime};

use crate::infra::db::{get_snowflake, parse_optional_datetime, parse_required_datetime};

/// Reports older than this are refreshed from the event index.
pub const REPORT_MAX_AGE: Duration = Duration::hours(24);

/// Place and score use this until the index ranks the team.
pub const UNKNOWN_RANK: i64 = -1;

/// One tracked competition inside a guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ctf {
    pub id: i64,
    pub guild_id: u64,
    pub name: String,
    pub description: String,
    pub text_channel_id: Option<u64>,
    pub event_id: Option<u64>,
    pub role_id: Option<u64>,
    pub message_id: Option<u64>,
    pub ctftime_id: i64,
    pub created_at: OffsetDateTime,
}

impl FromRow<'_, SqliteRow> for Ctf {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let guild_id: i64 = row.try_get("guild_id")?;
        Ok(Ctf {
            id: row.try_get("id")?,
            guild_id: guild_id as u64,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            text_channel_id: get_snowflake(row, "text_channel_id")?,
            event_id: get_snowflake(row, "event_id")?,
            role_id: get_snowflake(row, "role_id")?,
            message_id: get_snowflake(row, "message_id")?,
            ctftime_id: row.try_get("ctftime_id")?,
            created_at: parse_required_datetime(row, "created_at")?,
        })
    }
}

/// Everything collected by the creation steps, written in one insert.
#[derive(Debug, Clone)]
pub struct NewCtf {
    pub guild_id: u64,
    pub name: String,
    pub description: String,
    pub text_channel_id: u64,
    pub event_id: u64,
    pub role_id: u64,
    pub message_id: u64,
    pub ctftime_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub ctf_id: i64,
    pub place: i64,
    pub score: i64,
    pub solves: i64,
    /// Last successful refresh from the event index.
    pub refreshed_at: Option<OffsetDateTime>,
    pub updated_at: OffsetDateTime,
}

impl Report {
    pub fn needs_refresh(&self, now: OffsetDateTime) -> bool {
        if self.place == UNKNOWN_RANK || self.score == UNKNOWN_RANK {
            return true;
        }
        match self.refreshed_at {
            Some(refreshed_at) => now - refreshed_at > REPORT_MAX_AGE,
            None => true,
        }
    }
}

impl FromRow<'_, SqliteRow> for Report {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Report {
            ctf_id: row.try_get("ctf_id")?,
            place: row.try_get("place")?,
            score: row.try_get("score")?,
            solves: row.try_get("solves")?,
            refreshed_at: parse_optional_datetime(row, "refreshed_at")?,
            updated_at: parse_required_datetime(row, "updated_at")?,
        })
    }
}

#[derive(Debug)]
pub struct Credentials {
    pub ctf_id: i64,
    pub username: String,
    pub password: SecretString,
    /// Account belongs to one member rather than the team.
    pub personal: bool,
}

impl FromRow<'_, SqliteRow> for Credentials {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let password: String = row.try_get("password")?;
        Ok(Credentials {
            ctf_id: row.try_get("ctf_id")?,
            username: row.try_get("username")?,
            password: SecretString::from(password),
            personal: row.try_get("personal")?,
        })
    }
}
