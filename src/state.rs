use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dashmap::DashMap;
use serenity::all::{GuildInfo, UserId};
use tokio::sync::Mutex;

use crate::config::Config;
use crate::db::Db;
use crate::error::ReconcileError;
use crate::reconcile::GuildMembershipReconciler;
use crate::repos::{UserGuild, UserGuildsRepo};

/// AppState: holds the Db handle and in-memory coordination state.
/// No SQL here.
pub struct AppState {
    pub db: Db,

    call_timeout: Option<Duration>,

    /// One lock per user with a guild sync in flight (or recently finished).
    user_sync_locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl AppState {
    pub async fn new(config: &Config) -> Result<Arc<Self>> {
        let db = Db::connect(&config.database_url, config.max_connections).await?;
        Ok(Arc::new(Self::with_db(db, config.call_timeout)))
    }

    pub fn with_db(db: Db, call_timeout: Option<Duration>) -> Self {
        Self {
            db,
            call_timeout,
            user_sync_locks: DashMap::new(),
        }
    }

    /// Store the guild list Discord reported for `user_id`.
    ///
    /// Syncs for the same user run one at a time; different users do not block each other.
    pub async fn sync_user_guilds(
        &self,
        user_id: UserId,
        guilds: &[GuildInfo],
    ) -> Result<(), ReconcileError> {
        let desired: Vec<UserGuild> = guilds.iter().map(UserGuild::from).collect();
        self.reconcile_user_guilds(user_id, &desired).await
    }

    pub async fn reconcile_user_guilds(
        &self,
        user_id: UserId,
        desired: &[UserGuild],
    ) -> Result<(), ReconcileError> {
        let lock = self
            .user_sync_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        GuildMembershipReconciler::new(UserGuildsRepo::new(&self.db))
            .with_call_timeout(self.call_timeout)
            .reconcile(user_id.get(), desired)
            .await
    }

    /// Drop locks nobody is holding or waiting on.
    pub fn prune_idle_locks(&self) {
        let before = self.user_sync_locks.len();
        self.user_sync_locks
            .retain(|_, lock| Arc::strong_count(lock) > 1);
        let pruned = before.saturating_sub(self.user_sync_locks.len());
        if pruned > 0 {
            tracing::debug!(pruned, "Pruned idle user sync locks");
        }
    }

    pub fn sync_lock_count(&self) -> usize {
        self.user_sync_locks.len()
    }

    pub async fn close(&self) {
        self.db.close().await;
    }
}
