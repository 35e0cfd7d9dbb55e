//! Query cache backend selection.

use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheBackend, CacheConfig, MemoryQueryCache, QueryCache};

use super::{error::InfraError, file_cache::FileQueryCache};

/// Open the backend named by `config`.
pub fn open_query_cache(config: &CacheConfig) -> Result<Arc<dyn QueryCache>, InfraError> {
    match config.backend {
        CacheBackend::Memory => {
            info!(limit = config.query_limit, "Using in-process query cache");
            Ok(Arc::new(MemoryQueryCache::new(config)))
        }
        CacheBackend::File => {
            let directory = config
                .directory
                .clone()
                .ok_or_else(|| InfraError::configuration("cache directory is not configured"))?;
            info!(directory = %directory.display(), "Using shared file query cache");
            Ok(Arc::new(FileQueryCache::open(directory, config.ttl)?))
        }
    }
}
