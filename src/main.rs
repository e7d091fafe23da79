//! Account store service check.
//!
//! Resolves configuration (defaults, `pgsqlConfig.json`, `pg*` environment
//! variables), initialises logging, connects and runs a health check.
//!
//! Usage: `mmo_account_store [--config <dir>]`

use anyhow::Context;

use mmo_account_store::config::{AppConfig, DEFAULT_CONFIG_DIR};
use mmo_account_store::db::Database;
use mmo_account_store::logging::init_logging;

fn get_config_dir() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    DEFAULT_CONFIG_DIR.to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_dir = get_config_dir();
    let (config, report) = AppConfig::load(&config_dir)
        .with_context(|| format!("Failed to load configuration from {}", config_dir))?;
    let _log_guard = init_logging(&config.log)?;
    report.log();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        endpoint = %config.postgres.describe(),
        "Starting account store"
    );

    let db = Database::connect(&config.postgres).await?;
    db.health_check()
        .await
        .context("PostgreSQL health check failed")?;

    tracing::info!("PostgreSQL health check passed");
    Ok(())
}
