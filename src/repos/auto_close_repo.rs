use anyhow::Result;
use chrono::TimeDelta;

use crate::db::{Db, to_db_id, to_db_seconds};

/// Per-guild ticket auto-close thresholds. `None` disables that trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoCloseSettings {
    pub enabled: bool,
    pub since_open_with_no_response: Option<TimeDelta>,
    pub since_last_message: Option<TimeDelta>,
}

#[derive(Clone)]
pub struct AutoCloseRepo<'a> {
    db: &'a Db,
}

impl<'a> AutoCloseRepo<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    pub fn schema(&self) -> &'static str {
        r#"
        CREATE TABLE IF NOT EXISTS auto_close (
            guild_id                    INTEGER NOT NULL,
            enabled                     BOOLEAN NOT NULL,
            since_open_with_no_response INTEGER,
            since_last_message          INTEGER,
            PRIMARY KEY (guild_id)
        )
        "#
    }

    /// Stored settings, or the disabled defaults when the guild never saved any.
    pub async fn get(&self, guild_id: u64) -> Result<AutoCloseSettings> {
        let rec = sqlx::query_as::<_, (bool, Option<i64>, Option<i64>)>(
            r#"
            SELECT enabled, since_open_with_no_response, since_last_message
            FROM auto_close WHERE guild_id = ?
            "#,
        )
        .bind(to_db_id(guild_id))
        .fetch_optional(&self.db.pool)
        .await?;

        Ok(rec
            .map(|(enabled, no_response, last_message)| AutoCloseSettings {
                enabled,
                since_open_with_no_response: no_response.map(TimeDelta::seconds),
                since_last_message: last_message.map(TimeDelta::seconds),
            })
            .unwrap_or_default())
    }

    pub async fn set(&self, guild_id: u64, settings: &AutoCloseSettings) -> Result<()> {
        let no_response = settings
            .since_open_with_no_response
            .map(to_db_seconds)
            .transpose()?;
        let last_message = settings.since_last_message.map(to_db_seconds).transpose()?;

        sqlx::query(
            r#"
            INSERT INTO auto_close (guild_id, enabled, since_open_with_no_response, since_last_message)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(guild_id) DO UPDATE SET
              enabled                     = excluded.enabled,
              since_open_with_no_response = excluded.since_open_with_no_response,
              since_last_message          = excluded.since_last_message
            "#,
        )
        .bind(to_db_id(guild_id))
        .bind(settings.enabled)
        .bind(no_response)
        .bind(last_message)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }
}
