use crate::config::{DBSettings, SqliteConfigSerde};
use log::debug;
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Row, Sqlite, SqlitePool,
};
use std::{future::Future, time::Duration as StdDuration};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/ctfhelper");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JournalMode {
    Wal,
    Delete,
    Memory,
}

impl JournalMode {
    fn pragma(&self) -> &'static str {
        match self {
            JournalMode::Wal => "WAL",
            JournalMode::Delete => "DELETE",
            JournalMode::Memory => "MEMORY",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynchronousMode {
    Off,
    Normal,
    Full,
}

impl SynchronousMode {
    fn pragma(&self) -> &'static str {
        match self {
            SynchronousMode::Off => "OFF",
            SynchronousMode::Normal => "NORMAL",
            SynchronousMode::Full => "FULL",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqliteConfig {
    pub busy_timeout_ms: u32,
    pub journal_mode: JournalMode,
    pub synchronous: SynchronousMode,
    pub cache_size: i32,
    pub foreign_keys: bool,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::Wal,
            synchronous: SynchronousMode::Normal,
            cache_size: 10000,
            foreign_keys: true,
        }
    }
}

impl SqliteConfig {
    pub fn testing() -> Self {
        Self {
            busy_timeout_ms: 1000,
            journal_mode: JournalMode::Memory,
            synchronous: SynchronousMode::Off,
            cache_size: 1000,
            foreign_keys: true,
        }
    }

    fn apply(&self, options: SqliteConnectOptions) -> SqliteConnectOptions {
        options
            .busy_timeout(StdDuration::from_millis(self.busy_timeout_ms as u64))
            .pragma("journal_mode", self.journal_mode.pragma())
            .pragma("synchronous", self.synchronous.pragma())
            .pragma("cache_size", self.cache_size.to_string())
            .foreign_keys(self.foreign_keys)
    }
}

impl From<SqliteConfigSerde> for SqliteConfig {
    fn from(config: SqliteConfigSerde) -> Self {
        Self {
            busy_timeout_ms: config.busy_timeout_ms,
            journal_mode: match config.journal_mode.to_uppercase().as_str() {
                "DELETE" => JournalMode::Delete,
                "MEMORY" => JournalMode::Memory,
                _ => JournalMode::Wal,
            },
            synchronous: match config.synchronous.to_uppercase().as_str() {
                "OFF" => SynchronousMode::Off,
                "FULL" => SynchronousMode::Full,
                _ => SynchronousMode::Normal,
            },
            cache_size: config.cache_size,
            foreign_keys: config.foreign_keys,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabasePoolConfig {
    pub read_max_connections: u32,
    pub write_max_connections: u32,
    pub idle_timeout_secs: u64,
    pub acquire_timeout_secs: u64,
    pub sqlite_config: SqliteConfig,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            read_max_connections: 8,
            // one writer keeps sqlite from returning SQLITE_BUSY under load
            write_max_connections: 1,
            idle_timeout_secs: 600,
            acquire_timeout_secs: 15,
            sqlite_config: SqliteConfig::default(),
        }
    }
}

impl From<DBSettings> for DatabasePoolConfig {
    fn from(config: DBSettings) -> Self {
        Self {
            read_max_connections: config.read_max_connections,
            write_max_connections: config.write_max_connections,
            idle_timeout_secs: config.idle_timeout_secs,
            acquire_timeout_secs: config.acquire_timeout_secs,
            sqlite_config: config.sqlite_config.into(),
        }
    }
}

/// Shared handle to the bot database, split into a read pool and a write pool.
#[derive(Clone, Debug)]
pub struct DBConnection {
    pub database_path: String,
    read_pool: SqlitePool,
    write_pool: SqlitePool,
}

impl DBConnection {
    pub async fn new(
        data_folder: &str,
        db_name: &str,
        pool_config: DatabasePoolConfig,
    ) -> Result<Self, sqlx::Error> {
        let database_path = format!("{}/{}.db", data_folder, db_name);
        let database_url = format!("sqlite:{}", database_path);
        if !Sqlite::database_exists(&database_url).await? {
            Sqlite::create_database(&database_url).await?;
        }

        let base = SqliteConnectOptions::new()
            .filename(&database_path)
            .create_if_missing(true);

        let write_options = pool_config.sqlite_config.apply(base.clone());
        debug!("Write connection: {:?}", write_options);
        let write_pool = SqlitePoolOptions::new()
            .max_connections(pool_config.write_max_connections)
            .acquire_timeout(StdDuration::from_secs(pool_config.acquire_timeout_secs))
            .idle_timeout(StdDuration::from_secs(pool_config.idle_timeout_secs))
            .connect_with(write_options)
            .await?;

        MIGRATOR
            .run(&write_pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

        let read_options = pool_config.sqlite_config.apply(base.read_only(true));
        debug!("Read connection: {:?}", read_options);
        let read_pool = SqlitePoolOptions::new()
            .max_connections(pool_config.read_max_connections)
            .acquire_timeout(StdDuration::from_secs(pool_config.acquire_timeout_secs))
            .idle_timeout(StdDuration::from_secs(pool_config.idle_timeout_secs))
            .connect_with(read_options)
            .await?;

        Ok(Self {
            database_path,
            read_pool,
            write_pool,
        })
    }

    /// Private in-memory database with migrations applied.
    ///
    /// A single pinned connection backs both pools, since every sqlite memory
    /// connection would otherwise see its own empty database.
    pub async fn in_memory() -> Result<Self, sqlx::Error> {
        let options = SqliteConfig::testing().apply(
            SqliteConnectOptions::new().filename(":memory:"),
        );
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| sqlx::Error::Migrate(Box::new(e)))?;

        Ok(Self {
            database_path: String::from(":memory:"),
            read_pool: pool.clone(),
            write_pool: pool,
        })
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.read_pool)
            .await?;
        let _: i32 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.write_pool)
            .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.read_pool.close().await;
        self.write_pool.close().await;
    }

    pub fn read(&self) -> &SqlitePool {
        &self.read_pool
    }

    pub fn write(&self) -> &SqlitePool {
        &self.write_pool
    }

    /// Runs `operation` against the write pool.
    pub async fn execute_write<F, Fut, T>(&self, operation: F) -> Result<T, sqlx::Error>
    where
        F: FnOnce(SqlitePool) -> Fut,
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        operation(self.write_pool.clone()).await
    }
}

pub fn format_datetime(value: OffsetDateTime) -> String {
    // Rfc3339 only fails for years outside 0..=9999
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

pub fn parse_required_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<OffsetDateTime, sqlx::Error> {
    let date_str: String = row.try_get(column)?;
    OffsetDateTime::parse(&date_str, &Rfc3339).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub fn parse_optional_datetime(
    row: &SqliteRow,
    column: &str,
) -> Result<Option<OffsetDateTime>, sqlx::Error> {
    row.try_get::<Option<String>, _>(column)?
        .map(|s| OffsetDateTime::parse(&s, &Rfc3339))
        .transpose()
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

/// Snowflake ids are stored as signed integers; `NULL` means unset.
pub fn get_snowflake(row: &SqliteRow, column: &str) -> Result<Option<u64>, sqlx::Error> {
    Ok(row
        .try_get::<Option<i64>, _>(column)?
        .map(|value| value as u64))
}

pub fn snowflake_param(id: Option<u64>) -> Option<i64> {
    id.map(|value| value as i64)
}

/// True when `error` is a UNIQUE constraint violation.
pub fn is_unique_violation(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => db_error.is_unique_violation(),
        _ => false,
    }
}
