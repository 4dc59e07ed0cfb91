// SQLite store: one pool shared by the lead and job repositories

use crate::{create_pool, run_migrations, SqliteJobRepository, SqliteLeadRepository};
use leadflow_core::error::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

pub struct SqliteStore {
    pool: SqlitePool,
    leads: Arc<SqliteLeadRepository>,
    jobs: Arc<SqliteJobRepository>,
}

impl SqliteStore {
    /// Open (creating if missing) and migrate the database at `database_url`
    pub async fn open(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        run_migrations(&pool).await?;
        info!(database_url, "Store ready");

        Ok(Self {
            leads: Arc::new(SqliteLeadRepository::new(pool.clone())),
            jobs: Arc::new(SqliteJobRepository::new(pool.clone())),
            pool,
        })
    }

    pub fn leads(&self) -> Arc<SqliteLeadRepository> {
        Arc::clone(&self.leads)
    }

    pub fn jobs(&self) -> Arc<SqliteJobRepository> {
        Arc::clone(&self.jobs)
    }

    /// Wait for in-flight statements and close every connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Store closed");
    }
}
