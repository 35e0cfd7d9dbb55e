//! Event subscriber wiring the statistics block and cache eviction into the board.

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::CacheInvalidator;
use crate::events::{EventDispatcher, EventListener, EventName, HostEvent, PageRender};

use super::stats::{StatsError, UserStatsService};

/// Handler methods exposed to the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerMethod {
    SetTemplateVariables,
    ClearCache,
}

/// Event → handler table registered at startup.
pub const SUBSCRIBED_EVENTS: [(EventName, ListenerMethod); 3] = [
    (
        EventName::IndexModifyPageTitle,
        ListenerMethod::SetTemplateVariables,
    ),
    (EventName::SubmitPostEnd, ListenerMethod::ClearCache),
    (EventName::DeleteTopicsAfterQuery, ListenerMethod::ClearCache),
];

pub struct UserStatsListener {
    stats: UserStatsService,
    invalidator: CacheInvalidator,
}

impl UserStatsListener {
    pub fn new(stats: UserStatsService, invalidator: CacheInvalidator) -> Self {
        Self { stats, invalidator }
    }

    pub fn subscribed_events() -> &'static [(EventName, ListenerMethod)] {
        &SUBSCRIBED_EVENTS
    }

    pub async fn set_template_variables(&self, render: &PageRender) -> Result<(), StatsError> {
        self.stats
            .set_template_variables(render.user.as_ref(), render.template.as_ref())
            .await
    }

    pub fn clear_cache(&self, event: EventName) {
        self.invalidator.on_mutation_event(event);
    }

    /// Register one handler per entry of [`SUBSCRIBED_EVENTS`].
    pub fn subscribe(self: &Arc<Self>, dispatcher: &mut EventDispatcher) {
        for (name, method) in SUBSCRIBED_EVENTS {
            dispatcher.add_listener(
                name,
                Arc::new(BoundHandler {
                    listener: Arc::clone(self),
                    method,
                }),
            );
        }
    }
}

struct BoundHandler {
    listener: Arc<UserStatsListener>,
    method: ListenerMethod,
}

#[async_trait]
impl EventListener for BoundHandler {
    async fn handle(&self, event: &HostEvent) -> Result<(), StatsError> {
        match (self.method, event) {
            (ListenerMethod::SetTemplateVariables, HostEvent::IndexModifyPageTitle(render)) => {
                self.listener.set_template_variables(render).await
            }
            (ListenerMethod::SetTemplateVariables, _) => Ok(()),
            (ListenerMethod::ClearCache, event) => {
                self.listener.clear_cache(event.name());
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use crate::application::display::SearchLinks;
    use crate::application::repos::{QueryRepo, QueryRow, RanksRepo, RepoError};
    use crate::cache::{CacheConfig, MemoryQueryCache, QueryCache, TableNames};
    use crate::domain::ranks::RankRecord;

    use super::*;

    struct NoQueries;

    #[async_trait]
    impl QueryRepo for NoQueries {
        async fn fetch_rows(&self, _sql: &str) -> Result<Vec<QueryRow>, RepoError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl RanksRepo for NoQueries {
        async fn list_ranks(&self) -> Result<Vec<RankRecord>, RepoError> {
            Ok(Vec::new())
        }
    }

    fn listener() -> Arc<UserStatsListener> {
        let cache: Arc<dyn QueryCache> = Arc::new(MemoryQueryCache::new(&CacheConfig::default()));
        let tables = TableNames::default();
        let stats = UserStatsService::new(
            Arc::new(NoQueries),
            Arc::new(NoQueries),
            cache.clone(),
            tables.clone(),
            SearchLinks::default(),
        );
        Arc::new(UserStatsListener::new(
            stats,
            CacheInvalidator::new(cache, &tables),
        ))
    }

    #[test]
    fn subscription_table_lists_render_then_mutations() {
        let names: Vec<&str> = UserStatsListener::subscribed_events()
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "core.index_modify_page_title",
                "core.submit_post_end",
                "core.delete_topics_after_query",
            ]
        );
        assert_eq!(SUBSCRIBED_EVENTS[0].1, ListenerMethod::SetTemplateVariables);
        assert_eq!(SUBSCRIBED_EVENTS[1].1, ListenerMethod::ClearCache);
        assert_eq!(SUBSCRIBED_EVENTS[2].1, ListenerMethod::ClearCache);
    }

    #[test]
    fn subscribe_registers_one_handler_per_event() {
        let mut dispatcher = EventDispatcher::new();
        listener().subscribe(&mut dispatcher);

        for name in EventName::ALL {
            assert_eq!(dispatcher.listener_count(name), 1);
        }
    }

    #[tokio::test]
    async fn mutation_dispatch_succeeds_on_empty_cache() {
        let mut dispatcher = EventDispatcher::new();
        listener().subscribe(&mut dispatcher);

        let ran = dispatcher
            .dispatch(&HostEvent::DeleteTopicsAfterQuery)
            .await
            .unwrap();
        assert_eq!(ran, 1);
    }
}
