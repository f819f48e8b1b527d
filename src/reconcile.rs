//! Guild membership reconciliation.
//!
//! Brings the stored guild list of one user in line with an authoritative list:
//! one bulk delete of every guild that is no longer listed, then one upsert per
//! listed guild, in input order. The two phases are not wrapped in a transaction.
//!
//! The reconciler does not serialize concurrent calls for the same user; two
//! overlapping runs can leave a state matching neither input. Callers that may
//! trigger refreshes concurrently go through [`crate::state::AppState::sync_user_guilds`].

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ReconcileError, RowFailure, StoreError};
use crate::repos::UserGuild;

/// The two row-store calls reconciliation needs.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    /// Delete every row of `user_id` whose guild is not in `guild_ids`, in one statement.
    /// An empty set deletes all of the user's rows. Returns rows affected (0 is fine).
    async fn delete_where_user_and_guild_not_in(
        &self,
        user_id: u64,
        guild_ids: &BTreeSet<u64>,
    ) -> Result<u64, StoreError>;

    /// Insert, or update name/owner/permissions on `(user_id, guild_id)` conflict.
    async fn upsert_membership(&self, user_id: u64, guild: &UserGuild) -> Result<(), StoreError>;
}

pub struct GuildMembershipReconciler<S> {
    store: S,
    call_timeout: Option<Duration>,
}

impl<S: MembershipStore> GuildMembershipReconciler<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            call_timeout: None,
        }
    }

    /// Deadline applied to each row-store call separately.
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn reconcile(&self, user_id: u64, desired: &[UserGuild]) -> Result<(), ReconcileError> {
        let keep: BTreeSet<u64> = desired.iter().map(|g| g.guild_id).collect();

        let removed = self
            .call(self.store.delete_where_user_and_guild_not_in(user_id, &keep))
            .await
            .map_err(|source| {
                tracing::warn!(user_id, error = %source, "Pruning stale guilds failed; skipping upserts");
                ReconcileError::Delete { user_id, source }
            })?;
        tracing::debug!(user_id, removed, kept = keep.len(), "Pruned stale guilds");

        let mut failures = Vec::new();
        for guild in desired {
            if let Err(error) = self.call(self.store.upsert_membership(user_id, guild)).await {
                tracing::warn!(user_id, guild_id = guild.guild_id, error = %error, "Guild upsert failed");
                failures.push(RowFailure {
                    guild_id: guild.guild_id,
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ReconcileError::Upserts {
                user_id,
                attempted: desired.len(),
                failures,
            })
        }
    }

    async fn call<T>(&self, fut: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| StoreError::Timeout(limit))?,
            None => fut.await,
        }
    }
}
