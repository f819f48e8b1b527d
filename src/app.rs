use anyhow::{Context as AnyhowContext, Result};
use tracing_subscriber::EnvFilter;

use guildstore::db::Table;
use guildstore::{AppState, Config};

/// Open the database, bootstrap every table, report what is stored, close.
pub async fn run() -> Result<()> {
    let config = Config::from_env()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let state = AppState::new(&config)
        .await
        .with_context(|| format!("opening {}", config.database_url))?;

    for table in Table::ALL {
        let rows = state.db.count_rows(table).await?;
        tracing::info!("{}: {rows} rows", table.name());
    }

    state.close().await;
    Ok(())
}
