use ctfhelper_core::EventStatus;
use log::{debug, info};
use secrecy::ExposeSecret;
use time::OffsetDateTime;

use crate::{
    domain::Error,
    infra::{
        ctftime::TeamResult,
        db::{format_datetime, is_unique_violation, DBConnection},
    },
};

use super::{Credentials, Ctf, NewCtf, Report, UNKNOWN_RANK};

const CTF_COLUMNS: &str = "id, guild_id, name, description, text_channel_id, event_id, role_id, message_id, ctftime_id, created_at";
const REPORT_COLUMNS: &str = "ctf_id, place, score, solves, refreshed_at, updated_at";

/// Snowflake lookups that resolve a single ctf inside a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtfLookup {
    Channel(u64),
    Message(u64),
    Event(u64),
}

impl CtfLookup {
    fn column(&self) -> &'static str {
        match self {
            CtfLookup::Channel(_) => "text_channel_id",
            CtfLookup::Message(_) => "message_id",
            CtfLookup::Event(_) => "event_id",
        }
    }

    fn value(&self) -> i64 {
        match *self {
            CtfLookup::Channel(id) | CtfLookup::Message(id) | CtfLookup::Event(id) => id as i64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CtfStore {
    db_connection: DBConnection,
}

impl CtfStore {
    pub fn new(db_connection: DBConnection) -> Self {
        Self { db_connection }
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        self.db_connection.ping().await
    }

    /// Fails with [`Error::DuplicateCtf`] when the name or index id is taken in the guild.
    pub async fn insert(&self, ctf: NewCtf) -> Result<Ctf, Error> {
        let now = format_datetime(OffsetDateTime::now_utc());
        let name = ctf.name.clone();
        let query = format!(
            "INSERT INTO ctfs (
                guild_id,
                name,
                description,
                text_channel_id,
                event_id,
                role_id,
                message_id,
                ctftime_id,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {}",
            CTF_COLUMNS
        );

        let inserted = self
            .db_connection
            .execute_write(move |pool| async move {
                sqlx::query_as::<_, Ctf>(&query)
                    .bind(ctf.guild_id as i64)
                    .bind(ctf.name)
                    .bind(ctf.description)
                    .bind(ctf.text_channel_id as i64)
                    .bind(ctf.event_id as i64)
                    .bind(ctf.role_id as i64)
                    .bind(ctf.message_id as i64)
                    .bind(ctf.ctftime_id)
                    .bind(now)
                    .fetch_one(&pool)
                    .await
            })
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    Error::DuplicateCtf(name)
                } else {
                    Error::DbError(e)
                }
            })?;

        info!(
            "stored ctf {} ({}) for guild {}",
            inserted.id, inserted.name, inserted.guild_id
        );
        Ok(inserted)
    }

    pub async fn get(&self, ctf_id: i64) -> Result<Option<Ctf>, sqlx::Error> {
        let query = format!("SELECT {} FROM ctfs WHERE id = ?", CTF_COLUMNS);
        sqlx::query_as::<_, Ctf>(&query)
            .bind(ctf_id)
            .fetch_optional(self.db_connection.read())
            .await
    }

    pub async fn find(&self, guild_id: u64, lookup: CtfLookup) -> Result<Option<Ctf>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM ctfs WHERE guild_id = ? AND {} = ?",
            CTF_COLUMNS,
            lookup.column()
        );
        sqlx::query_as::<_, Ctf>(&query)
            .bind(guild_id as i64)
            .bind(lookup.value())
            .fetch_optional(self.db_connection.read())
            .await
    }

    /// First ctf whose name contains `fragment`, oldest first.
    pub async fn find_by_name_fragment(
        &self,
        guild_id: u64,
        fragment: &str,
    ) -> Result<Option<Ctf>, sqlx::Error> {
        if fragment.trim().is_empty() {
            return Ok(None);
        }
        let query = format!(
            "SELECT {} FROM ctfs WHERE guild_id = ? AND instr(name, ?) > 0 ORDER BY id LIMIT 1",
            CTF_COLUMNS
        );
        sqlx::query_as::<_, Ctf>(&query)
            .bind(guild_id as i64)
            .bind(fragment)
            .fetch_optional(self.db_connection.read())
            .await
    }

    pub async fn exists(
        &self,
        guild_id: u64,
        name: &str,
        ctftime_id: i64,
    ) -> Result<bool, sqlx::Error> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM ctfs WHERE guild_id = ? AND (name = ? OR ctftime_id = ?) LIMIT 1",
        )
        .bind(guild_id as i64)
        .bind(name)
        .bind(ctftime_id)
        .fetch_optional(self.db_connection.read())
        .await?;
        Ok(found.is_some())
    }

    pub async fn list(&self, guild_id: u64) -> Result<Vec<Ctf>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM ctfs WHERE guild_id = ? ORDER BY id",
            CTF_COLUMNS
        );
        sqlx::query_as::<_, Ctf>(&query)
            .bind(guild_id as i64)
            .fetch_all(self.db_connection.read())
            .await
    }

    /// Deletes the ctf together with its report and credentials.
    pub async fn delete_with_children(&self, ctf_id: i64) -> Result<bool, sqlx::Error> {
        self.db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;
                sqlx::query("DELETE FROM reports WHERE ctf_id = ?")
                    .bind(ctf_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("DELETE FROM creds WHERE ctf_id = ?")
                    .bind(ctf_id)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query(
                    "DELETE FROM event_statuses WHERE event_id = (SELECT event_id FROM ctfs WHERE id = ?)",
                )
                .bind(ctf_id)
                .execute(&mut *tx)
                .await?;
                let removed = sqlx::query("DELETE FROM ctfs WHERE id = ?")
                    .bind(ctf_id)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
                Ok(removed.rows_affected() > 0)
            })
            .await
    }

    /// Stores `status` as the last seen status of a scheduled event and
    /// returns the one it replaces.
    pub async fn swap_event_status(
        &self,
        guild_id: u64,
        event_id: u64,
        status: EventStatus,
    ) -> Result<Option<EventStatus>, sqlx::Error> {
        let now = format_datetime(OffsetDateTime::now_utc());
        let previous = self
            .db_connection
            .execute_write(move |pool| async move {
                let mut tx = pool.begin().await?;
                let previous: Option<String> =
                    sqlx::query_scalar("SELECT status FROM event_statuses WHERE event_id = ?")
                        .bind(event_id as i64)
                        .fetch_optional(&mut *tx)
                        .await?;
                sqlx::query(
                    "INSERT INTO event_statuses (event_id, guild_id, status, updated_at)
                     VALUES (?, ?, ?, ?)
                     ON CONFLICT (event_id) DO UPDATE SET
                        status = excluded.status,
                        updated_at = excluded.updated_at",
                )
                .bind(event_id as i64)
                .bind(guild_id as i64)
                .bind(status.state_name())
                .bind(now)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
                Ok(previous)
            })
            .await?;
        Ok(previous.as_deref().map(EventStatus::from_state_name))
    }

    pub async fn get_report(&self, ctf_id: i64) -> Result<Option<Report>, sqlx::Error> {
        let query = format!("SELECT {} FROM reports WHERE ctf_id = ?", REPORT_COLUMNS);
        sqlx::query_as::<_, Report>(&query)
            .bind(ctf_id)
            .fetch_optional(self.db_connection.read())
            .await
    }

    /// Adds one solve, creating the report on first use. Returns the new count.
    pub async fn increment_solves(&self, ctf_id: i64) -> Result<i64, sqlx::Error> {
        let now = format_datetime(OffsetDateTime::now_utc());
        let solves = self
            .db_connection
            .execute_write(move |pool| async move {
                sqlx::query_scalar::<_, i64>(
                    "INSERT INTO reports (ctf_id, place, score, solves, created_at, updated_at)
                     VALUES (?, -1, -1, 1, ?, ?)
                     ON CONFLICT (ctf_id) DO UPDATE SET
                        solves = reports.solves + 1,
                        updated_at = excluded.updated_at
                     RETURNING solves",
                )
                .bind(ctf_id)
                .bind(&now)
                .bind(&now)
                .fetch_one(&pool)
                .await
            })
            .await?;
        debug!("ctf {} now has {} solves", ctf_id, solves);
        Ok(solves)
    }

    /// Removes one solve without going below zero. `None` when there is no report.
    pub async fn decrement_solves(&self, ctf_id: i64) -> Result<Option<i64>, sqlx::Error> {
        let now = format_datetime(OffsetDateTime::now_utc());
        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query_scalar::<_, i64>(
                    "UPDATE reports SET solves = MAX(solves - 1, 0), updated_at = ?
                     WHERE ctf_id = ?
                     RETURNING solves",
                )
                .bind(now)
                .bind(ctf_id)
                .fetch_optional(&pool)
                .await
            })
            .await
    }

    /// Stores a refresh from the event index. Local solves are kept when the
    /// index lags behind them; a missing team leaves place and score unknown.
    pub async fn record_refresh(
        &self,
        ctf_id: i64,
        result: Option<TeamResult>,
        now: OffsetDateTime,
    ) -> Result<Report, sqlx::Error> {
        let (place, score, solves) = match result {
            Some(result) => (result.place, result.score, result.solves.max(0)),
            None => (UNKNOWN_RANK, UNKNOWN_RANK, 0),
        };
        let now = format_datetime(now);
        let query = format!(
            "INSERT INTO reports (ctf_id, place, score, solves, refreshed_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (ctf_id) DO UPDATE SET
                place = excluded.place,
                score = excluded.score,
                solves = MAX(reports.solves, excluded.solves),
                refreshed_at = excluded.refreshed_at,
                updated_at = excluded.updated_at
             RETURNING {}",
            REPORT_COLUMNS
        );

        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query_as::<_, Report>(&query)
                    .bind(ctf_id)
                    .bind(place)
                    .bind(score)
                    .bind(solves)
                    .bind(&now)
                    .bind(&now)
                    .bind(&now)
                    .fetch_one(&pool)
                    .await
            })
            .await
    }

    pub async fn get_creds(&self, ctf_id: i64) -> Result<Option<Credentials>, sqlx::Error> {
        sqlx::query_as::<_, Credentials>(
            "SELECT ctf_id, username, password, personal FROM creds WHERE ctf_id = ?",
        )
        .bind(ctf_id)
        .fetch_optional(self.db_connection.read())
        .await
    }

    /// Stores the credentials, overwriting an earlier submission.
    pub async fn upsert_creds(&self, creds: &Credentials) -> Result<(), sqlx::Error> {
        let now = format_datetime(OffsetDateTime::now_utc());
        let ctf_id = creds.ctf_id;
        let username = creds.username.clone();
        let password = creds.password.expose_secret().to_string();
        let personal = creds.personal;

        self.db_connection
            .execute_write(move |pool| async move {
                sqlx::query(
                    "INSERT INTO creds (ctf_id, username, password, personal, created_at, updated_at)
                     VALUES (?, ?, ?, ?, ?, ?)
                     ON CONFLICT (ctf_id) DO UPDATE SET
                        username = excluded.username,
                        password = excluded.password,
                        personal = excluded.personal,
                        updated_at = excluded.updated_at",
                )
                .bind(ctf_id)
                .bind(username)
                .bind(password)
                .bind(personal)
                .bind(&now)
                .bind(&now)
                .execute(&pool)
                .await?;
                Ok(())
            })
            .await
    }

    pub async fn delete_creds(&self, ctf_id: i64) -> Result<bool, sqlx::Error> {
        self.db_connection
            .execute_write(move |pool| async move {
                let result = sqlx::query("DELETE FROM creds WHERE ctf_id = ?")
                    .bind(ctf_id)
                    .execute(&pool)
                    .await?;
                Ok(result.rows_affected() > 0)
            })
            .await
    }
}
