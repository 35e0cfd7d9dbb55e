//! Query result cache.
//!
//! Entries are keyed by literal query text and remember the tables they read,
//! so a whole table bucket can be evicted at once.

use std::sync::RwLock;
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::QueryRow;

use super::config::CacheConfig;
use super::keys::CacheKey;
use super::lock::{rw_read, rw_write};
use super::registry::CacheRegistry;

const SOURCE: &str = "cache::store";

const METRIC_QUERY_CACHE_HIT: &str = "userstats_query_cache_hit_total";
const METRIC_QUERY_CACHE_MISS: &str = "userstats_query_cache_miss_total";
const METRIC_QUERY_CACHE_EVICT: &str = "userstats_query_cache_evict_total";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A cached query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedQuery {
    /// Opaque handle identifying this particular write.
    pub query_id: Uuid,
    pub rows: Vec<QueryRow>,
    /// Tables the query reads from.
    pub tables: Vec<String>,
    #[serde(with = "time::serde::timestamp")]
    pub cached_at: OffsetDateTime,
}

impl CachedQuery {
    pub fn new(rows: Vec<QueryRow>, tables: Vec<String>) -> Self {
        Self {
            query_id: Uuid::new_v4(),
            rows,
            tables,
            cached_at: OffsetDateTime::now_utc(),
        }
    }

    pub fn depends_on(&self, table: &str) -> bool {
        self.tables.iter().any(|candidate| candidate == table)
    }

    pub fn is_expired(&self, ttl: Option<Duration>, now: OffsetDateTime) -> bool {
        let Some(ttl) = ttl else {
            return false;
        };
        let age = now - self.cached_at;
        age.is_positive() && age.unsigned_abs() >= ttl
    }
}

/// Storage for cached query results.
///
/// `remove` on an absent key succeeds.
pub trait QueryCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<CachedQuery>, CacheError>;
    fn put(&self, key: &str, entry: CachedQuery) -> Result<(), CacheError>;
    fn remove(&self, key: &CacheKey) -> Result<(), CacheError>;
    fn clear(&self) -> Result<(), CacheError>;
}

/// In-process LRU query cache.
pub struct MemoryQueryCache {
    entries: RwLock<LruCache<String, CachedQuery>>,
    registry: CacheRegistry,
    ttl: Option<Duration>,
}

impl MemoryQueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(config.query_limit_non_zero())),
            registry: CacheRegistry::new(),
            ttl: config.ttl,
        }
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains(key)
    }

    fn pop(&self, key: &str) -> bool {
        let removed = rw_write(&self.entries, SOURCE, "pop").pop(key).is_some();
        self.registry.unregister(key);
        removed
    }
}

impl QueryCache for MemoryQueryCache {
    fn get(&self, key: &str) -> Result<Option<CachedQuery>, CacheError> {
        let entry = rw_write(&self.entries, SOURCE, "get").get(key).cloned();

        match entry {
            Some(entry) if entry.is_expired(self.ttl, OffsetDateTime::now_utc()) => {
                self.pop(key);
                counter!(METRIC_QUERY_CACHE_MISS).increment(1);
                debug!(query_id = %entry.query_id, "Expired query cache entry");
                Ok(None)
            }
            Some(entry) => {
                counter!(METRIC_QUERY_CACHE_HIT).increment(1);
                Ok(Some(entry))
            }
            None => {
                counter!(METRIC_QUERY_CACHE_MISS).increment(1);
                Ok(None)
            }
        }
    }

    fn put(&self, key: &str, entry: CachedQuery) -> Result<(), CacheError> {
        let tables = entry.tables.clone();
        let displaced = rw_write(&self.entries, SOURCE, "put").push(key.to_string(), entry);

        if let Some((evicted, _)) = displaced
            && evicted != key
        {
            self.registry.unregister(&evicted);
            counter!(METRIC_QUERY_CACHE_EVICT).increment(1);
        }

        self.registry.register(key, tables);
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        match key {
            CacheKey::Query(sql) => {
                self.pop(sql);
            }
            CacheKey::Table(table) => {
                let affected = self.registry.unregister_table(table);
                let mut entries = rw_write(&self.entries, SOURCE, "remove.table");
                for query in &affected {
                    entries.pop(query);
                }
            }
        }
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "clear").clear();
        self.registry.clear();
        Ok(())
    }
}
