//! Error taxonomy for the membership row store and the reconciler.

use std::time::Duration;

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Failure of a single row-store call.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store unreachable, or the statement itself is broken.
    #[error("row store error: {0}")]
    Transport(#[source] sqlx::Error),

    /// The store rejected this particular row (constraint, encoding).
    #[error("row rejected: {0}")]
    RowWrite(#[source] sqlx::Error),

    #[error("guild id set could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("row store call timed out after {0:?}")]
    Timeout(Duration),
}

impl StoreError {
    pub fn is_row_write(&self) -> bool {
        matches!(self, Self::RowWrite(_) | Self::Encode(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if !matches!(db_err.kind(), ErrorKind::Other)
                    || db_err.message().contains("constraint failed") =>
            {
                StoreError::RowWrite(err)
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::RowWrite(err),
            _ => StoreError::Transport(err),
        }
    }
}

/// One membership row that could not be written.
#[derive(Debug)]
pub struct RowFailure {
    pub guild_id: u64,
    pub error: StoreError,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Stale rows could not be pruned; no upsert was attempted.
    #[error("pruning stale guilds for user {user_id} failed: {source}")]
    Delete {
        user_id: u64,
        #[source]
        source: StoreError,
    },

    /// Every row was attempted; these ones failed.
    #[error(
        "{} of {attempted} guild upserts failed for user {user_id}, last on guild {}: {}",
        .failures.len(),
        last_guild(.failures),
        last_error(.failures)
    )]
    Upserts {
        user_id: u64,
        attempted: usize,
        failures: Vec<RowFailure>,
    },
}

impl ReconcileError {
    /// The most recent failure encountered.
    pub fn last(&self) -> Option<&StoreError> {
        match self {
            Self::Delete { source, .. } => Some(source),
            Self::Upserts { failures, .. } => failures.last().map(|f| &f.error),
        }
    }

    pub fn failed_guilds(&self) -> Vec<u64> {
        match self {
            Self::Delete { .. } => Vec::new(),
            Self::Upserts { failures, .. } => failures.iter().map(|f| f.guild_id).collect(),
        }
    }
}

fn last_guild(failures: &[RowFailure]) -> u64 {
    failures.last().map(|f| f.guild_id).unwrap_or_default()
}

fn last_error(failures: &[RowFailure]) -> String {
    failures
        .last()
        .map(|f| f.error.to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_failures_are_row_errors() {
        assert!(StoreError::from(sqlx::Error::Decode("bad bool".into())).is_row_write());
    }

    #[test]
    fn pool_failures_are_transport_errors() {
        let err = StoreError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, StoreError::Transport(_)));
        assert!(!err.is_row_write());
    }
}
