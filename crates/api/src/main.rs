use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use rangeforge_api::config::ServerConfig;
use rangeforge_api::{build_state, router::build_app_router};
use rangeforge_db::{MemoryStore, PgStore, Store};
use rangeforge_provisioner::{CommandProvisioner, ProvisionerConfig};
use rangeforge_worker::shutdown::shutdown_signal;
use rangeforge_worker::{JobExecutor, WorkSignal, WorkerConfig, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rangeforge_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env()?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Store ---
    let (store, db) = match &config.database_url {
        Some(url) => {
            let pool = rangeforge_db::create_pool(url)
                .await
                .context("Failed to connect to database")?;
            rangeforge_db::health_check(&pool)
                .await
                .context("Database health check failed")?;
            rangeforge_db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Using PostgreSQL store");
            let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
            (store, Some(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state is kept in memory only");
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            (store, None)
        }
    };

    // --- Workers ---
    let signal = WorkSignal::new();
    let workers = if config.embedded_workers {
        let worker_config = WorkerConfig::from_env()?;
        let provisioner = CommandProvisioner::new(ProvisionerConfig::from_env()?);
        let executor = JobExecutor::new(Arc::clone(&store), Arc::new(provisioner), worker_config);
        Some(WorkerPool::new(executor, signal.clone()).spawn(CancellationToken::new()))
    } else {
        tracing::info!("Embedded workers disabled, jobs run in rangeforge-worker");
        None
    };

    // --- Router ---
    let state = build_state(store, db, signal);
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().context("Invalid HOST address")?,
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");
    if let Some(workers) = workers {
        tracing::info!("Waiting for in-flight jobs to finish");
        workers.shutdown().await;
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}
