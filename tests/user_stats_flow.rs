//! Drives the statistics block and cache eviction through the event bus.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono_tz::Tz;
use serde_json::json;

use userstats::application::display::{DisplayRecord, SearchLinks, TemplateSink, US_RTITLE, US_TOPICS};
use userstats::application::listener::UserStatsListener;
use userstats::application::repos::{QueryRepo, QueryRow, RanksRepo, RepoError};
use userstats::application::stats::{StatsError, UserStatsService};
use userstats::cache::{
    CacheConfig, CacheInvalidator, MemoryQueryCache, TableNames, USER_TOPICS_COLUMN,
    user_topics_query,
};
use userstats::domain::ranks::RankRecord;
use userstats::domain::users::SessionUser;
use userstats::events::{EventDispatcher, HostEvent, PageRender};

/// Topics table keyed by poster, counting approved topics only.
struct FakeBoard {
    approved_topics: Mutex<Vec<(i64, i64)>>,
    queries: AtomicUsize,
    seen_sql: Mutex<Vec<String>>,
    offline: bool,
}

impl FakeBoard {
    fn with_topics(topics: &[(i64, i64)]) -> Self {
        Self {
            approved_topics: Mutex::new(topics.to_vec()),
            queries: AtomicUsize::new(0),
            seen_sql: Mutex::new(Vec::new()),
            offline: false,
        }
    }

    fn offline() -> Self {
        Self {
            offline: true,
            ..Self::with_topics(&[])
        }
    }

    fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryRepo for FakeBoard {
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<QueryRow>, RepoError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.seen_sql.lock().unwrap().push(sql.to_string());
        if self.offline {
            return Err(RepoError::from_persistence("connection refused"));
        }

        let topics = self.approved_topics.lock().unwrap();
        let count = topics
            .iter()
            .filter(|(poster, _)| sql.contains(&format!("topic_poster = {poster} ")))
            .map(|(_, count)| *count)
            .sum::<i64>();

        let mut row = QueryRow::new();
        row.insert(USER_TOPICS_COLUMN.to_string(), json!(count));
        Ok(vec![row])
    }
}

#[async_trait]
impl RanksRepo for FakeBoard {
    async fn list_ranks(&self) -> Result<Vec<RankRecord>, RepoError> {
        Ok(vec![RankRecord {
            id: 1,
            title: "Site Admin".to_string(),
            min_posts: 0,
            special: true,
        }])
    }
}

#[derive(Default)]
struct RecordingTemplate {
    assigned: Mutex<Vec<DisplayRecord>>,
}

impl RecordingTemplate {
    fn calls(&self) -> usize {
        self.assigned.lock().unwrap().len()
    }

    fn last_value(&self, field: &str) -> Option<String> {
        self.assigned
            .lock()
            .unwrap()
            .last()
            .and_then(|record| record.get(field).map(str::to_string))
    }
}

impl TemplateSink for RecordingTemplate {
    fn assign_vars(&self, vars: DisplayRecord) {
        self.assigned.lock().unwrap().push(vars);
    }
}

struct Board {
    store: Arc<FakeBoard>,
    cache: Arc<MemoryQueryCache>,
    dispatcher: EventDispatcher,
}

fn board(store: FakeBoard) -> Board {
    let store = Arc::new(store);
    let cache = Arc::new(MemoryQueryCache::new(&CacheConfig::default()));
    let tables = TableNames::default();

    let stats = UserStatsService::new(
        store.clone(),
        store.clone(),
        cache.clone(),
        tables.clone(),
        SearchLinks::default(),
    );
    let listener = Arc::new(UserStatsListener::new(
        stats,
        CacheInvalidator::new(cache.clone(), &tables),
    ));

    let mut dispatcher = EventDispatcher::new();
    listener.subscribe(&mut dispatcher);

    Board {
        store,
        cache,
        dispatcher,
    }
}

fn admin() -> SessionUser {
    SessionUser {
        id: 1,
        is_registered: true,
        ip: "127.0.0.1".to_string(),
        registered_at: 946_684_800,
        posts: 20,
        rank_id: 1,
        timezone: Tz::UTC,
        date_format: "%d.%m.%Y %-H:%M:%S".to_string(),
    }
}

fn render_event(user: SessionUser, template: &Arc<RecordingTemplate>) -> HostEvent {
    HostEvent::IndexModifyPageTitle(PageRender {
        user: Arc::new(user),
        template: template.clone(),
    })
}

#[tokio::test]
async fn guest_render_touches_nothing() {
    let board = board(FakeBoard::with_topics(&[(1, 3)]));
    let template = Arc::new(RecordingTemplate::default());
    let guest = SessionUser::guest("10.0.0.7", Tz::UTC, "%Y");

    board
        .dispatcher
        .dispatch(&render_event(guest, &template))
        .await
        .unwrap();

    assert_eq!(template.calls(), 0);
    assert_eq!(board.store.queries(), 0);
    assert!(board.cache.is_empty());
}

#[tokio::test]
async fn topic_count_is_cached_until_a_post_is_submitted() {
    let board = board(FakeBoard::with_topics(&[(1, 3), (2, 5)]));
    let template = Arc::new(RecordingTemplate::default());

    board
        .dispatcher
        .dispatch(&render_event(admin(), &template))
        .await
        .unwrap();
    assert_eq!(template.last_value(US_TOPICS).as_deref(), Some("3"));
    assert_eq!(template.last_value(US_RTITLE).as_deref(), Some("Site Admin"));
    assert_eq!(board.store.queries(), 1);
    assert!(
        board
            .cache
            .contains(&user_topics_query(&TableNames::default(), 1))
    );

    board
        .dispatcher
        .dispatch(&render_event(admin(), &template))
        .await
        .unwrap();
    assert_eq!(template.last_value(US_TOPICS).as_deref(), Some("3"));
    assert_eq!(board.store.queries(), 1);

    board
        .dispatcher
        .dispatch(&HostEvent::SubmitPostEnd)
        .await
        .unwrap();
    assert!(board.cache.is_empty());

    board
        .dispatcher
        .dispatch(&render_event(admin(), &template))
        .await
        .unwrap();
    assert_eq!(template.last_value(US_TOPICS).as_deref(), Some("3"));
    assert_eq!(board.store.queries(), 2);
    assert_eq!(template.calls(), 3);
}

#[tokio::test]
async fn deleting_topics_evicts_every_member() {
    let board = board(FakeBoard::with_topics(&[(1, 3), (2, 5)]));
    let template = Arc::new(RecordingTemplate::default());
    let mut other = admin();
    other.id = 2;

    board
        .dispatcher
        .dispatch(&render_event(admin(), &template))
        .await
        .unwrap();
    board
        .dispatcher
        .dispatch(&render_event(other.clone(), &template))
        .await
        .unwrap();
    assert_eq!(template.last_value(US_TOPICS).as_deref(), Some("5"));
    assert_eq!(board.cache.len(), 2);

    board
        .dispatcher
        .dispatch(&HostEvent::DeleteTopicsAfterQuery)
        .await
        .unwrap();
    assert!(board.cache.is_empty());

    board
        .dispatcher
        .dispatch(&render_event(other, &template))
        .await
        .unwrap();
    assert_eq!(board.store.queries(), 3);
}

#[tokio::test]
async fn repeated_eviction_is_harmless() {
    let board = board(FakeBoard::with_topics(&[(1, 3)]));
    let template = Arc::new(RecordingTemplate::default());

    board
        .dispatcher
        .dispatch(&HostEvent::SubmitPostEnd)
        .await
        .unwrap();
    board
        .dispatcher
        .dispatch(&HostEvent::SubmitPostEnd)
        .await
        .unwrap();

    board
        .dispatcher
        .dispatch(&render_event(admin(), &template))
        .await
        .unwrap();
    board
        .dispatcher
        .dispatch(&render_event(admin(), &template))
        .await
        .unwrap();
    assert_eq!(board.store.queries(), 1);
    assert_eq!(template.last_value(US_TOPICS).as_deref(), Some("3"));
}

#[tokio::test]
async fn every_render_issues_the_same_query_text() {
    let board = board(FakeBoard::with_topics(&[(1, 3)]));
    let template = Arc::new(RecordingTemplate::default());

    for _ in 0..2 {
        board
            .dispatcher
            .dispatch(&render_event(admin(), &template))
            .await
            .unwrap();
        board
            .dispatcher
            .dispatch(&HostEvent::SubmitPostEnd)
            .await
            .unwrap();
    }

    let seen = board.store.seen_sql.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], seen[1]);
    assert_eq!(seen[0], user_topics_query(&TableNames::default(), 1));
}

#[tokio::test]
async fn store_failure_fails_the_render() {
    let board = board(FakeBoard::offline());
    let template = Arc::new(RecordingTemplate::default());

    let err = board
        .dispatcher
        .dispatch(&render_event(admin(), &template))
        .await
        .expect_err("store is offline");

    assert!(matches!(err.source, StatsError::Repo(RepoError::Persistence(_))));
    assert_eq!(template.calls(), 0);
    assert!(board.cache.is_empty());
}
