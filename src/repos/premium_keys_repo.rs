use anyhow::Result;
use chrono::TimeDelta;

use crate::db::{Db, Table, to_db_seconds};

#[derive(Clone)]
pub struct PremiumKeysRepo<'a> {
    db: &'a Db,
}

impl<'a> PremiumKeysRepo<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    /// `length` is the premium duration the key grants, in seconds.
    pub fn schema(&self) -> &'static str {
        r#"
        CREATE TABLE IF NOT EXISTS premium_keys (
            "key"  VARCHAR(36) NOT NULL UNIQUE CHECK (length("key") <= 36),
            length INTEGER     NOT NULL,
            PRIMARY KEY ("key")
        )
        "#
    }

    /// Create a key, or change the length of an existing one.
    pub async fn create(&self, key: &str, length: TimeDelta) -> Result<()> {
        let length = to_db_seconds(length)?;
        sqlx::query(
            r#"
            INSERT INTO premium_keys ("key", length) VALUES (?, ?)
            ON CONFLICT("key") DO UPDATE SET length = excluded.length
            "#,
        )
        .bind(key)
        .bind(length)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }

    /// Consume a key. Returns the length it granted, `None` if it never existed
    /// or was already redeemed.
    pub async fn delete(&self, key: &str) -> Result<Option<TimeDelta>> {
        let length: Option<i64> =
            sqlx::query_scalar(r#"DELETE FROM premium_keys WHERE "key" = ? RETURNING length"#)
                .bind(key)
                .fetch_optional(&self.db.pool)
                .await?;
        Ok(length.map(TimeDelta::seconds))
    }
}
