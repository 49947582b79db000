//! Durable metadata store for the sandbox orchestrator: environments,
//! snapshot versions, sandbox activity, task-run fields, api keys, and
//! code-host provider connections. Backed by SQLite via `sqlx`.

pub mod activity;
pub mod api_keys;
pub mod environments;
pub mod error;
pub mod github;
pub mod membership;
pub mod models;
mod schema;
pub mod snapshots;
pub mod task_runs;

use sqlx::SqlitePool;

pub use error::{Error, Result};

/// Handle to the metadata store. Cheap to clone — wraps a pooled
/// connection, same as every other client singleton in this service.
#[derive(Clone)]
pub struct MetadataStore {
    pool: SqlitePool,
}

impl MetadataStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        schema::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        schema::ensure_schema(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
