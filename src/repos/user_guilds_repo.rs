use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serenity::all::GuildInfo;
use sqlx::FromRow;

use crate::db::{Db, from_db_id, to_db_id};
use crate::error::{ReconcileError, StoreError};
use crate::reconcile::{GuildMembershipReconciler, MembershipStore};

/// One guild as seen from one user's account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGuild {
    pub guild_id: u64,
    pub name: String,
    pub owner: bool,
    pub permissions: i32,
}

impl From<&GuildInfo> for UserGuild {
    fn from(info: &GuildInfo) -> Self {
        Self {
            guild_id: info.id.get(),
            name: info.name.clone(),
            owner: info.owner,
            // Column is int4; keep the low 32 permission bits.
            permissions: info.permissions.bits() as u32 as i32,
        }
    }
}

#[derive(FromRow)]
struct UserGuildRecord {
    guild_id: i64,
    name: String,
    owner: bool,
    permissions: i32,
}

impl From<UserGuildRecord> for UserGuild {
    fn from(r: UserGuildRecord) -> Self {
        Self {
            guild_id: from_db_id(r.guild_id),
            name: r.name,
            owner: r.owner,
            permissions: r.permissions,
        }
    }
}

#[derive(Clone)]
pub struct UserGuildsRepo<'a> {
    db: &'a Db,
}

impl<'a> UserGuildsRepo<'a> {
    pub fn new(db: &'a Db) -> Self {
        Self { db }
    }

    pub fn schema(&self) -> &'static str {
        r#"
        CREATE TABLE IF NOT EXISTS user_guilds (
            user_id     INTEGER     NOT NULL,
            guild_id    INTEGER     NOT NULL,
            name        VARCHAR(32) NOT NULL CHECK (length(name) <= 32),
            owner       BOOLEAN     NOT NULL,
            permissions INTEGER     NOT NULL,
            PRIMARY KEY (user_id, guild_id)
        )
        "#
    }

    // ---------- reads ----------

    /// Every guild stored for this user, by ascending guild id. Empty when the user was never synced.
    pub async fn get(&self, user_id: u64) -> anyhow::Result<Vec<UserGuild>> {
        let rows = sqlx::query_as::<_, UserGuildRecord>(
            r#"
            SELECT guild_id, name, owner, permissions
            FROM user_guilds
            WHERE user_id = ?
            "#,
        )
        .bind(to_db_id(user_id))
        .fetch_all(&self.db.pool)
        .await?;

        // Sort after the cast back to u64; SQL would order ids >= 2^63 as negatives.
        let mut guilds: Vec<UserGuild> = rows.into_iter().map(UserGuild::from).collect();
        guilds.sort_unstable_by_key(|g| g.guild_id);
        Ok(guilds)
    }

    // ---------- writes ----------

    /// Make the stored guild list of `user_id` exactly `guilds`.
    ///
    /// Not atomic: stale rows are pruned first, then each guild is upserted on its own.
    /// A failed upsert does not stop the others; see [`GuildMembershipReconciler`].
    pub async fn set(&self, user_id: u64, guilds: &[UserGuild]) -> Result<(), ReconcileError> {
        GuildMembershipReconciler::new(self.clone())
            .reconcile(user_id, guilds)
            .await
    }
}

#[async_trait]
impl MembershipStore for UserGuildsRepo<'_> {
    async fn delete_where_user_and_guild_not_in(
        &self,
        user_id: u64,
        guild_ids: &BTreeSet<u64>,
    ) -> Result<u64, StoreError> {
        // Whole set goes in as one JSON array parameter; json_each expands it server side.
        let keep: Vec<i64> = guild_ids.iter().copied().map(to_db_id).collect();
        let keep = serde_json::to_string(&keep)?;

        let res = sqlx::query(
            r#"
            DELETE FROM user_guilds
             WHERE user_id = ?
               AND guild_id NOT IN (SELECT value FROM json_each(?))
            "#,
        )
        .bind(to_db_id(user_id))
        .bind(keep)
        .execute(&self.db.pool)
        .await
        .map_err(StoreError::Transport)?;

        Ok(res.rows_affected())
    }

    async fn upsert_membership(&self, user_id: u64, guild: &UserGuild) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO user_guilds (user_id, guild_id, name, owner, permissions)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(user_id, guild_id) DO UPDATE SET
              name        = excluded.name,
              owner       = excluded.owner,
              permissions = excluded.permissions
            "#,
        )
        .bind(to_db_id(user_id))
        .bind(to_db_id(guild.guild_id))
        .bind(&guild.name)
        .bind(guild.owner)
        .bind(guild.permissions)
        .execute(&self.db.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guild(id: u64, name: &str) -> UserGuild {
        UserGuild {
            guild_id: id,
            name: name.to_string(),
            owner: false,
            permissions: 0x0400,
        }
    }

    #[tokio::test]
    async fn get_returns_empty_for_unknown_user() {
        let db = Db::connect_in_memory().await.unwrap();
        let repo = UserGuildsRepo::new(&db);
        assert!(repo.get(42).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_keeps_only_listed_guilds_for_that_user() {
        let db = Db::connect_in_memory().await.unwrap();
        let repo = UserGuildsRepo::new(&db);
        for id in [1, 2, 3] {
            repo.upsert_membership(7, &guild(id, "g")).await.unwrap();
        }
        repo.upsert_membership(8, &guild(1, "other user")).await.unwrap();

        let keep = BTreeSet::from([2u64]);
        let removed = repo.delete_where_user_and_guild_not_in(7, &keep).await.unwrap();
        assert_eq!(removed, 2);

        let ids: Vec<u64> = repo.get(7).await.unwrap().iter().map(|g| g.guild_id).collect();
        assert_eq!(ids, vec![2]);
        assert_eq!(repo.get(8).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_with_nothing_to_remove_is_not_an_error() {
        let db = Db::connect_in_memory().await.unwrap();
        let repo = UserGuildsRepo::new(&db);
        let removed = repo
            .delete_where_user_and_guild_not_in(99, &BTreeSet::new())
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn upsert_updates_in_place() {
        let db = Db::connect_in_memory().await.unwrap();
        let repo = UserGuildsRepo::new(&db);
        repo.upsert_membership(1, &guild(5, "old")).await.unwrap();
        let updated = UserGuild {
            guild_id: 5,
            name: "new".into(),
            owner: true,
            permissions: -1,
        };
        repo.upsert_membership(1, &updated).await.unwrap();

        assert_eq!(repo.get(1).await.unwrap(), vec![updated]);
    }

    #[tokio::test]
    async fn oversize_name_is_a_row_write_error() {
        let db = Db::connect_in_memory().await.unwrap();
        let repo = UserGuildsRepo::new(&db);
        let err = repo
            .upsert_membership(1, &guild(5, &"x".repeat(33)))
            .await
            .unwrap_err();
        assert!(err.is_row_write(), "unexpected error: {err:?}");

        // 32 characters, multi-byte, still fits
        repo.upsert_membership(1, &guild(6, &"é".repeat(32))).await.unwrap();
    }

    #[tokio::test]
    async fn high_bit_snowflakes_survive() {
        let db = Db::connect_in_memory().await.unwrap();
        let repo = UserGuildsRepo::new(&db);
        let big = u64::MAX - 3;
        repo.set(big, &[guild(big, "edge")]).await.unwrap();
        assert_eq!(repo.get(big).await.unwrap()[0].guild_id, big);

        // and the delete set matches them too
        repo.set(big, &[guild(big, "edge")]).await.unwrap();
        assert_eq!(repo.get(big).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn get_orders_by_unsigned_guild_id() {
        let db = Db::connect_in_memory().await.unwrap();
        let repo = UserGuildsRepo::new(&db);
        let top = 1u64 << 63;
        repo.set(3, &[guild(top, "top"), guild(i64::MAX as u64, "mid"), guild(0, "zero")])
            .await
            .unwrap();

        let ids: Vec<u64> = repo.get(3).await.unwrap().iter().map(|g| g.guild_id).collect();
        assert_eq!(ids, vec![0, i64::MAX as u64, top]);
    }
}
