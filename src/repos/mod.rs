pub mod auto_close_repo;
pub mod premium_keys_repo;
pub mod user_guilds_repo;

pub use auto_close_repo::{AutoCloseRepo, AutoCloseSettings};
pub use premium_keys_repo::PremiumKeysRepo;
pub use user_guilds_repo::{UserGuild, UserGuildsRepo};
