//! Schema management for the MarketMate database.
//!
//! Usage: `migration [up|down|status|fresh]` (defaults to `up`). The target
//! database comes from the regular application configuration.

use marketmate_api::{config, migrator::Migrator};
use sea_orm::{ConnectOptions, Database};
use sea_orm_migration::prelude::*;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config()?;
    config::init_tracing(&cfg.log_level, cfg.log_json, None);

    let command = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());
    info!(%command, "Starting database migration");

    let mut options = ConnectOptions::new(cfg.database_url.clone());
    options
        .max_connections(1)
        .connect_timeout(Duration::from_secs(cfg.db_connect_timeout_secs))
        .acquire_timeout(Duration::from_secs(cfg.db_acquire_timeout_secs))
        .sqlx_logging(false);
    let db = Database::connect(options).await?;

    match command.as_str() {
        "up" => Migrator::up(&db, None).await?,
        "down" => Migrator::down(&db, Some(1)).await?,
        "status" => Migrator::status(&db).await?,
        "fresh" => {
            if cfg.is_production() {
                anyhow::bail!("refusing to drop every table in production");
            }
            Migrator::fresh(&db).await?
        }
        other => {
            error!("unknown migration command: {}", other);
            anyhow::bail!("unknown command {other}; expected up, down, status or fresh");
        }
    }

    info!("Migration completed successfully");
    Ok(())
}
