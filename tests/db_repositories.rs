//! Postgres adapter tests.
//!
//! Marked `#[ignore]`: they need `DATABASE_URL` pointing at a disposable server.

use std::sync::{Arc, Mutex};

use chrono_tz::Tz;
use sqlx::PgPool;

use userstats::application::display::{DisplayRecord, SearchLinks, TemplateSink, US_REGDATE, US_RTITLE, US_TOPICS};
use userstats::application::listener::UserStatsListener;
use userstats::application::repos::{QueryRepo, RanksRepo, UsersRepo};
use userstats::application::stats::UserStatsService;
use userstats::cache::{
    CacheConfig, CacheInvalidator, MemoryQueryCache, TableNames, USER_TOPICS_COLUMN,
    user_topics_query,
};
use userstats::domain::users::SessionUser;
use userstats::events::{EventDispatcher, HostEvent, PageRender};
use userstats::infra::db::PostgresRepositories;

async fn seed(pool: &PgPool) {
    sqlx::query(
        "INSERT INTO phpbb_ranks (rank_id, rank_title, rank_min, rank_special) VALUES \
         (1, 'Site Admin', 0, TRUE), (2, 'Newcomer', 0, FALSE), (3, 'Regular', 10, FALSE)",
    )
    .execute(pool)
    .await
    .expect("seed ranks");

    sqlx::query(
        "INSERT INTO phpbb_users (user_id, user_type, username, user_ip, user_regdate, user_posts, \
         user_rank, user_timezone, user_dateformat) VALUES \
         (1, 3, 'admin', '127.0.0.1', 946684800, 20, 1, 'UTC', '%d.%m.%Y %-H:%M:%S'), \
         (2, 1, 'dormant', '10.0.0.2', 946684800, 0, 0, '', '')",
    )
    .execute(pool)
    .await
    .expect("seed users");

    sqlx::query(
        "INSERT INTO phpbb_topics (topic_title, topic_poster, topic_visibility) VALUES \
         ('one', 1, 1), ('two', 1, 1), ('three', 1, 1), ('pending', 1, 0), ('deleted', 1, 2)",
    )
    .execute(pool)
    .await
    .expect("seed topics");
}

#[derive(Default)]
struct RecordingTemplate {
    assigned: Mutex<Vec<DisplayRecord>>,
}

impl TemplateSink for RecordingTemplate {
    fn assign_vars(&self, vars: DisplayRecord) {
        self.assigned.lock().unwrap().push(vars);
    }
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn topic_query_counts_only_approved_topics(pool: PgPool) {
    seed(&pool).await;
    let repos = PostgresRepositories::new(pool, TableNames::default());

    let rows = repos
        .fetch_rows(&user_topics_query(&TableNames::default(), 1))
        .await
        .expect("query runs");

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][USER_TOPICS_COLUMN], serde_json::json!(3));
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn ranks_and_users_are_loaded(pool: PgPool) {
    seed(&pool).await;
    let repos = PostgresRepositories::new(pool, TableNames::default());

    let ranks = repos.list_ranks().await.expect("ranks load");
    assert_eq!(ranks.len(), 3);

    let admin = repos
        .find_user(1)
        .await
        .expect("lookup")
        .expect("admin exists");
    assert_eq!(admin.ip, "127.0.0.1");
    assert_eq!(admin.posts, 20);

    assert!(repos.find_user(99).await.expect("lookup").is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore]
async fn render_event_reads_through_the_database(pool: PgPool) {
    seed(&pool).await;
    let repos = Arc::new(PostgresRepositories::new(pool, TableNames::default()));
    let cache = Arc::new(MemoryQueryCache::new(&CacheConfig::default()));
    let tables = TableNames::default();

    let stats = UserStatsService::new(
        repos.clone(),
        repos.clone(),
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

    let record = repos
        .find_user(1)
        .await
        .expect("lookup")
        .expect("admin exists");
    let user = SessionUser::from_record(record, Tz::UTC, "%Y-%m-%d");
    let template = Arc::new(RecordingTemplate::default());

    dispatcher
        .dispatch(&HostEvent::IndexModifyPageTitle(PageRender {
            user: Arc::new(user),
            template: template.clone(),
        }))
        .await
        .expect("render succeeds");

    let assigned = template.assigned.lock().unwrap();
    assert_eq!(assigned.len(), 1);
    assert_eq!(assigned[0].get(US_TOPICS), Some("3"));
    assert_eq!(assigned[0].get(US_RTITLE), Some("Site Admin"));
    assert_eq!(assigned[0].get(US_REGDATE), Some("01.01.2000 0:00:00"));
    assert_eq!(cache.len(), 1);
}
