use std::sync::Arc;

use anyhow::Context;
use rangeforge_core::config::env_required;
use rangeforge_db::{PgStore, Store};
use rangeforge_provisioner::{CommandProvisioner, ProvisionerConfig};
use rangeforge_worker::shutdown::shutdown_signal;
use rangeforge_worker::{JobExecutor, WorkSignal, WorkerConfig, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rangeforge_worker=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let worker_config = WorkerConfig::from_env()?;
    let provisioner_config = ProvisionerConfig::from_env()?;
    let database_url = env_required("DATABASE_URL")?;
    tracing::info!(
        concurrency = worker_config.concurrency,
        provisioner = %provisioner_config.command,
        "Loaded worker configuration",
    );

    // --- Database ---
    let pool = rangeforge_db::create_pool(&database_url)
        .await
        .context("Failed to connect to database")?;
    rangeforge_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Pool ---
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let provisioner = Arc::new(CommandProvisioner::new(provisioner_config));
    let executor = JobExecutor::new(store, provisioner, worker_config);

    // Submissions arrive through another process, so workers rely on
    // their poll interval rather than wake-ups.
    let handle = WorkerPool::new(executor, WorkSignal::new()).spawn(CancellationToken::new());

    shutdown_signal().await;
    tracing::info!("Waiting for in-flight jobs to finish");
    handle.shutdown().await;

    Ok(())
}
