//! Shared key/value cache.
//!
//! Values are JSON. Entries may carry an expiry; expired entries read as
//! absent. Writers overwrite unconditionally, so two callers that both miss
//! and recompute simply store the same answer twice.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use thiserror::Error;

use super::db::LocalDb;
use crate::types::DataError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(#[from] DataError),

    #[error("cache value error: {0}")]
    Value(#[from] serde_json::Error),
}

/// Cache backend shared across requests.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read every present, unexpired key. Missing keys are absent from the map.
    async fn read_multi(&self, keys: &[String]) -> Result<HashMap<String, Value>, CacheError>;

    /// Write all entries with the same expiry. `None` never expires.
    async fn write_multi(
        &self,
        entries: Vec<(String, Value)>,
        expires_in: Option<Duration>,
    ) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    async fn read(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut found = self.read_multi(&[key.to_string()]).await?;
        Ok(found.remove(key))
    }

    async fn write(
        &self,
        key: &str,
        value: Value,
        expires_in: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.write_multi(vec![(key.to_string(), value)], expires_in)
            .await
    }
}

// ============================================================================
// SQLite-backed store
// ============================================================================

/// Cache persisted in the local database, shared by every invocation that
/// opens the same data directory.
pub struct SqliteCacheStore {
    db: LocalDb,
}

impl SqliteCacheStore {
    pub fn new(db: LocalDb) -> Self {
        Self { db }
    }

    /// Remove expired rows.
    pub async fn purge_expired(&self) -> Result<u64, CacheError> {
        Ok(self.db.cache_purge_expired(now_ms()).await?)
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[async_trait]
impl CacheStore for SqliteCacheStore {
    async fn read_multi(&self, keys: &[String]) -> Result<HashMap<String, Value>, CacheError> {
        let rows = self.db.cache_read_multi(keys, now_ms()).await?;

        rows.into_iter()
            .map(|row| Ok((row.key, serde_json::from_str(&row.value)?)))
            .collect()
    }

    async fn write_multi(
        &self,
        entries: Vec<(String, Value)>,
        expires_in: Option<Duration>,
    ) -> Result<(), CacheError> {
        // A TTL past the representable range never expires.
        let expires_at = expires_in.and_then(|ttl| {
            i64::try_from(ttl.as_millis())
                .ok()
                .and_then(|ms| now_ms().checked_add(ms))
        });
        let encoded = entries
            .into_iter()
            .map(|(k, v)| Ok((k, serde_json::to_string(&v)?)))
            .collect::<Result<Vec<_>, CacheError>>()?;

        self.db.cache_write_multi(&encoded, expires_at).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.db.cache_delete(key).await?;
        Ok(())
    }
}

// ============================================================================
// In-process store
// ============================================================================

/// Process-local cache, for tests and embedding.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, (Value, Option<Instant>)>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn read_multi(&self, keys: &[String]) -> Result<HashMap<String, Value>, CacheError> {
        let now = Instant::now();
        let mut found = HashMap::with_capacity(keys.len());

        for key in keys {
            if let Some(entry) = self.entries.get(key) {
                let (value, expires_at) = entry.value();
                if expires_at.is_none_or(|at| at > now) {
                    found.insert(key.clone(), value.clone());
                }
            }
        }

        Ok(found)
    }

    async fn write_multi(
        &self,
        entries: Vec<(String, Value)>,
        expires_in: Option<Duration>,
    ) -> Result<(), CacheError> {
        let expires_at = expires_in.and_then(|ttl| Instant::now().checked_add(ttl));
        for (key, value) in entries {
            self.entries.insert(key, (value, expires_at));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }
}
