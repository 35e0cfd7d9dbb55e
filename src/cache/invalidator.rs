//! Evicts cached topic queries when posts or topics change.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::events::EventName;

use super::keys::{CacheKey, TableNames};
use super::store::QueryCache;

/// Drops the shared topics bucket on every mutation event.
///
/// Eviction is deliberately not per user: any submitted post or deleted topic
/// clears every cached topic count.
pub struct CacheInvalidator {
    cache: Arc<dyn QueryCache>,
    key: CacheKey,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn QueryCache>, tables: &TableNames) -> Self {
        Self {
            cache,
            key: CacheKey::topics_bucket(tables),
        }
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Best effort: backend failures are logged, never returned.
    pub fn on_mutation_event(&self, event: EventName) {
        if !event.is_mutation() {
            debug!(event = %event, "Ignoring non-mutation event");
            return;
        }

        match self.cache.remove(&self.key) {
            Ok(()) => info!(event = %event, key = %self.key, "Evicted cached topic queries"),
            Err(err) => warn!(
                event = %event,
                key = %self.key,
                error = %err,
                "Failed to evict cached topic queries"
            ),
        }
    }
}
