//! Handles opened once per invocation.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::LocalConfig;
use super::cache::SqliteCacheStore;
use super::db::LocalDb;

/// Database, shared cache and configuration for one data directory.
pub struct LocalState {
    db: LocalDb,
    cache: Arc<SqliteCacheStore>,
    config: LocalConfig,
}

impl LocalState {
    /// Open the state stored in `data_dir`.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let db = LocalDb::open(&data_dir.join("db.sqlite"))
            .await
            .context("Failed to open SQLite database")?;
        let cache = Arc::new(SqliteCacheStore::new(db.clone()));
        let config = LocalConfig::load()?;

        Ok(Self { db, cache, config })
    }

    pub fn db(&self) -> &LocalDb {
        &self.db
    }

    pub fn cache(&self) -> Arc<SqliteCacheStore> {
        Arc::clone(&self.cache)
    }

    pub fn config(&self) -> &LocalConfig {
        &self.config
    }
}
