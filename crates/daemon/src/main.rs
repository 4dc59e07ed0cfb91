//! Leadflow daemon - composition root
//!
//! Opens and migrates the lead store, releases claims left behind by crashed
//! workers, then keeps sweeping expired claims until Ctrl+C.

mod settings;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use leadflow_core::application::{shutdown_channel, ClaimRecoveryService};
use leadflow_core::port::time_provider::SystemTimeProvider;
use leadflow_infra_sqlite::SqliteStore;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const REAPER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging (guard flushes the file sink on drop)
    let _log_guard = telemetry::init_logging()?;
    info!("Leadflow v{} starting...", VERSION);

    // 2. Configuration
    let config = settings::load()?;
    let database_url = config.database_url()?.to_string();
    info!(
        database_url = %database_url,
        lease_ms = config.claim.lease_ms,
        reaper_interval_ms = config.claim.reaper_interval_ms,
        "Configuration loaded"
    );

    // 3. Store + migrations
    let store = SqliteStore::open(&database_url)
        .await
        .with_context(|| format!("Failed to open store at {}", database_url))?;

    // 4. Startup claim recovery
    let time_provider = Arc::new(SystemTimeProvider);
    let recovery = Arc::new(ClaimRecoveryService::new(store.leads(), time_provider));

    info!("Running claim recovery...");
    match recovery.recover_expired_claims().await {
        Ok(count) => info!(released_claims = count, "Claim recovery completed"),
        Err(e) => error!(error = %e, "Claim recovery failed"),
    }

    // 5. Periodic reaper
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let interval = Duration::from_millis(config.claim.reaper_interval_ms);
    let reaper = {
        let recovery = Arc::clone(&recovery);
        tokio::spawn(async move { recovery.run(interval, shutdown_rx).await })
    };

    info!("System ready. Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown
    shutdown_tx.shutdown();
    if tokio::time::timeout(REAPER_STOP_TIMEOUT, reaper).await.is_err() {
        error!("Claim reaper did not stop in time");
    }
    store.close().await;

    info!("Shutdown complete.");
    Ok(())
}
