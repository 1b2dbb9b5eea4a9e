//! karma-sync entry point.
//!
//! Opens the local store, replays any offline writes left from a previous
//! session and keeps draining the queue on the configured interval until
//! ctrl-c. Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use karma_client::{DataService, DrainOutcome, HttpConfig, HttpEndpoint};
use karma_core::{AppConfig, CacheManager, SqliteStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;

    tracing::info!(
        api_base_url = %config.api_base_url,
        db_path = %config.db_path.display(),
        sync_interval_ms = config.sync_interval_ms,
        "Starting karma-sync"
    );

    let store = Arc::new(
        SqliteStore::open(&config.db_path)
            .await
            .with_context(|| format!("failed to open store at {}", config.db_path.display()))?,
    );

    let purged = CacheManager::new(Arc::clone(&store), config.ttl_policy())
        .purge_expired()
        .await
        .context("failed to purge expired cache entries")?;
    tracing::info!(purged, "purged expired cache entries");

    let remote = Arc::new(HttpEndpoint::new(HttpConfig::from(&config)).context("failed to build HTTP endpoint")?);
    let service = DataService::new(store, remote, &config).await;

    let pending = service.offline_queue_size().await;
    if pending > 0
        && let DrainOutcome::Completed(report) = service.force_sync().await
    {
        tracing::info!(pending, succeeded = report.succeeded, retried = report.retried, "initial drain complete");
    }

    service.start_sync().await;

    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("Shutting down");

    service.stop_sync().await;
    tracing::info!(pending = service.offline_queue_size().await, "karma-sync stopped");

    Ok(())
}
