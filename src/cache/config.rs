//! Cache configuration.
//!
//! Selects the query cache backend and its capacity via `userstats.toml`.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_QUERY_LIMIT: usize = 1000;

/// Storage behind the query cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local LRU.
    Memory,
    /// JSON files in a directory shared by every process on the host.
    File,
}

impl CacheBackend {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheBackend::Memory => "memory",
            CacheBackend::File => "file",
        }
    }

    /// Whether an eviction made by one process is seen by the others.
    pub fn is_process_shared(self) -> bool {
        matches!(self, CacheBackend::File)
    }
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "memory" => Ok(CacheBackend::Memory),
            "file" => Ok(CacheBackend::File),
            other => Err(format!(
                "unknown cache backend `{other}`, expected `memory` or `file`"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Directory for the file backend.
    pub directory: Option<PathBuf>,
    /// Maximum cached queries in the memory backend.
    pub query_limit: usize,
    /// Entries older than this are treated as absent. `None` keeps entries until evicted.
    pub ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            directory: None,
            query_limit: DEFAULT_QUERY_LIMIT,
            ttl: None,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            backend: settings.backend,
            directory: Some(settings.directory.clone()),
            query_limit: settings.query_limit.get(),
            ttl: settings.ttl,
        }
    }
}

impl CacheConfig {
    /// Returns the query limit as NonZeroUsize, clamping to 1 if zero.
    pub fn query_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.query_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
