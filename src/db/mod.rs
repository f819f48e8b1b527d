use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::TimeDelta;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::repos::{AutoCloseRepo, PremiumKeysRepo, UserGuildsRepo};

pub const MEMORY_URL: &str = "sqlite::memory:";

#[derive(Clone)]
pub struct Db {
    pub pool: Pool<Sqlite>,
}

impl Db {
    /// Open the pool and make sure every table exists.
    pub async fn connect(db_url: &str, max_connections: u32) -> Result<Self> {
        let in_memory = db_url.contains(":memory:");

        if !in_memory && !Sqlite::database_exists(db_url).await.unwrap_or(false) {
            Sqlite::create_database(db_url)
                .await
                .with_context(|| format!("creating database {db_url}"))?;
        }

        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid DATABASE_URL {db_url}"))?;

        // Each in-memory connection is its own database, so pin the pool to one
        // connection that never idles out.
        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections.max(1))
                .connect_with(options)
                .await?
        };
        tracing::info!(url = %db_url, "Database connected");

        let db = Self { pool };
        db.create_schema().await?;
        Ok(db)
    }

    /// Private throwaway database, used by tests.
    pub async fn connect_in_memory() -> Result<Self> {
        Self::connect(MEMORY_URL, 1).await
    }

    /// Run every table's `CREATE TABLE IF NOT EXISTS`.
    pub async fn create_schema(&self) -> Result<()> {
        let schemas = [
            AutoCloseRepo::new(self).schema(),
            PremiumKeysRepo::new(self).schema(),
            UserGuildsRepo::new(self).schema(),
        ];
        for schema in schemas {
            sqlx::query(schema)
                .execute(&self.pool)
                .await
                .context("bootstrapping schema")?;
        }
        tracing::info!(tables = schemas.len(), "Schema ready");
        Ok(())
    }

    pub async fn count_rows(&self, table: Table) -> Result<i64> {
        let q = format!("SELECT COUNT(*) FROM {}", table.name());
        let n: i64 = sqlx::query_scalar(&q).fetch_one(&self.pool).await?;
        Ok(n)
    }

    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Database closed");
    }
}

/// Tables this crate owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    AutoClose,
    PremiumKeys,
    UserGuilds,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::AutoClose, Table::PremiumKeys, Table::UserGuilds];

    pub fn name(self) -> &'static str {
        match self {
            Table::AutoClose => "auto_close",
            Table::PremiumKeys => "premium_keys",
            Table::UserGuilds => "user_guilds",
        }
    }
}

/// Durations are stored as whole seconds; anything finer is refused rather than truncated.
pub fn to_db_seconds(d: TimeDelta) -> Result<i64> {
    anyhow::ensure!(
        d.subsec_nanos() == 0,
        "duration {d} has a sub-second part; only whole seconds can be stored"
    );
    Ok(d.num_seconds())
}

/// Discord snowflakes are u64; SQLite integers are i64. Bit-cast both ways.
pub fn to_db_id(id: u64) -> i64 {
    id as i64
}

pub fn from_db_id(id: i64) -> u64 {
    id as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_i64() {
        for id in [1u64, 1429268494687408232, u64::MAX, i64::MAX as u64 + 1] {
            assert_eq!(from_db_id(to_db_id(id)), id);
        }
    }

    #[tokio::test]
    async fn schema_bootstrap_is_idempotent() {
        let db = Db::connect_in_memory().await.unwrap();
        db.create_schema().await.unwrap();
        for table in Table::ALL {
            assert_eq!(db.count_rows(table).await.unwrap(), 0);
        }
    }

    #[test]
    fn only_whole_second_durations_are_storable() {
        assert_eq!(to_db_seconds(TimeDelta::minutes(2)).unwrap(), 120);
        assert_eq!(to_db_seconds(TimeDelta::seconds(-5)).unwrap(), -5);
        assert!(to_db_seconds(TimeDelta::milliseconds(1500)).is_err());
    }
}
