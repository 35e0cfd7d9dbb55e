//! Query result cache for user statistics.
//!
//! Results are stored under their literal query text. Mutation events evict
//! the shared topics bucket through [`CacheInvalidator`].
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "file"
//! directory = "/var/cache/userstats"
//! query_limit = 1000
//! ttl_seconds = 3600
//! ```

mod config;
mod invalidator;
mod keys;
mod lock;
mod registry;
mod store;

pub use config::{CacheBackend, CacheConfig};
pub use invalidator::CacheInvalidator;
pub use keys::{CacheKey, DEFAULT_TABLE_PREFIX, TableNames, USER_TOPICS_COLUMN, user_topics_query};
pub use registry::CacheRegistry;
pub use store::{CacheError, CachedQuery, MemoryQueryCache, QueryCache};
