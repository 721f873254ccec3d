//! Persistence for blueprints, ranges and jobs.
//!
//! [`Store`] is the contract the dispatcher and workers program against.
//! [`MemoryStore`] keeps everything in process (tests, single-node dev);
//! [`PgStore`] is the PostgreSQL backend shared by API and worker processes.

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod memory;
pub mod postgres;
mod rows;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{BlueprintStore, JobStore, RangeStore, Store};

pub type DbPool = sqlx::PgPool;

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Round-trip a trivial query to confirm the database is reachable.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply pending migrations from `crates/db/migrations`.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
