//! FxBridge Binary
//!
//! Ingests daily FX rates on schedule until interrupted.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fxbridge_ingest::log_endpoints;
use fxbridge_service::{RatesService, SchedulerExit, ServiceConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = ServiceConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting FxBridge");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }
    log_endpoints(&config.fetcher_config()?);

    let cancel = CancellationToken::new();
    let service = Arc::new(RatesService::from_config(&config, cancel.clone())?);

    let scheduler = {
        let service = service.clone();
        tokio::spawn(async move { service.run_scheduler().await })
    };

    info!(
        interval_secs = config.update_interval.as_secs(),
        time_zone = %config.time_zone,
        "FxBridge running"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    cancel.cancel();

    match scheduler.await {
        Ok(SchedulerExit::Stopped) => info!("Scheduler exited"),
        Err(e) => error!(error = %e, "Scheduler task failed"),
    }

    if let Err(e) = service.shutdown().await {
        error!(error = %e, "Error during shutdown");
    }

    info!(
        metrics = ?service.metrics(),
        prometheus = %service.metrics_text(),
        "FxBridge shutdown complete"
    );
    Ok(())
}
