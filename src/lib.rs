pub mod config;
pub mod db;
pub mod error;
pub mod reconcile;
pub mod repos;
pub mod state;

pub use config::Config;
pub use db::Db;
pub use error::{ReconcileError, RowFailure, StoreError};
pub use reconcile::{GuildMembershipReconciler, MembershipStore};
pub use repos::{AutoCloseRepo, AutoCloseSettings, PremiumKeysRepo, UserGuild, UserGuildsRepo};
pub use state::AppState;
