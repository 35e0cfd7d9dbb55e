//! Per-user statistics shown on the board index.

use std::sync::Arc;

use metrics::counter;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::cache::{
    CacheError, CachedQuery, QueryCache, TableNames, USER_TOPICS_COLUMN, user_topics_query,
};
use crate::domain::ranks::resolve_rank_title;

use super::display::{
    BoardVersion, DateFormatError, DisplayRecord, S_IS_31, SearchLinks, TemplateSink, U_US_POSTS,
    U_US_TOPICS, US_ID, US_IP, US_POSTS, US_REGDATE, US_RTITLE, US_TOPICS, format_user_date,
};
use super::repos::{QueryRepo, QueryRow, RanksRepo, RepoError};
use super::session::UserSession;

const METRIC_TOPIC_CACHE_HIT: &str = "userstats_topic_cache_hit_total";
const METRIC_TOPIC_CACHE_MISS: &str = "userstats_topic_cache_miss_total";

#[derive(Debug, Error)]
pub enum StatsError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Date(#[from] DateFormatError),
}

/// Builds the statistics block for the signed-in member.
pub struct UserStatsService {
    queries: Arc<dyn QueryRepo>,
    ranks: Arc<dyn RanksRepo>,
    cache: Arc<dyn QueryCache>,
    tables: TableNames,
    links: SearchLinks,
    board_version: BoardVersion,
}

impl UserStatsService {
    pub fn new(
        queries: Arc<dyn QueryRepo>,
        ranks: Arc<dyn RanksRepo>,
        cache: Arc<dyn QueryCache>,
        tables: TableNames,
        links: SearchLinks,
    ) -> Self {
        Self {
            queries,
            ranks,
            cache,
            tables,
            links,
            board_version: BoardVersion::default(),
        }
    }

    pub fn with_board_version(mut self, version: BoardVersion) -> Self {
        self.board_version = version;
        self
    }

    /// Assemble the display record for `user`.
    ///
    /// Guests get `None` and cause no cache or store access.
    pub async fn produce_display_record(
        &self,
        user: &dyn UserSession,
    ) -> Result<Option<DisplayRecord>, StatsError> {
        if !user.is_authenticated() {
            return Ok(None);
        }

        let user_id = user.user_id();
        let registered = format_user_date(user.registered_at(), user.timezone(), user.date_format())?;

        let ranks = self.ranks.list_ranks().await?;
        let rank_title = resolve_rank_title(&ranks, user.rank_id(), user.posts()).unwrap_or_default();

        let topics = self.user_topics(user_id).await?;

        let mut record = DisplayRecord::new();
        record.insert(US_IP, user.ip());
        record.insert(US_REGDATE, registered);
        record.insert(US_ID, user_id.to_string());
        record.insert(US_POSTS, user.posts().to_string());
        record.insert(U_US_POSTS, self.links.own_posts());
        record.insert(US_RTITLE, rank_title);
        record.insert(US_TOPICS, topics.to_string());
        record.insert(U_US_TOPICS, self.links.own_topics());
        record.insert(S_IS_31, self.board_version.is_31().to_string());

        Ok(Some(record))
    }

    /// Render-event handler: hands the record to `template` once, or does nothing for guests.
    pub async fn set_template_variables(
        &self,
        user: &dyn UserSession,
        template: &dyn TemplateSink,
    ) -> Result<(), StatsError> {
        if let Some(record) = self.produce_display_record(user).await? {
            template.assign_vars(record);
        }
        Ok(())
    }

    /// Approved topics started by `user_id`, read through the query cache.
    pub async fn user_topics(&self, user_id: i64) -> Result<i64, StatsError> {
        let sql = user_topics_query(&self.tables, user_id);

        if let Some(entry) = self.cache.get(&sql)? {
            match topic_count(&entry.rows) {
                Some(count) => {
                    counter!(METRIC_TOPIC_CACHE_HIT).increment(1);
                    debug!(user_id, topics = count, "Topic count served from cache");
                    return Ok(count);
                }
                None => warn!(
                    user_id,
                    query_id = %entry.query_id,
                    "Discarding undecodable cached topic count"
                ),
            }
        }

        counter!(METRIC_TOPIC_CACHE_MISS).increment(1);
        let rows = self.queries.fetch_rows(&sql).await?;
        let count = topic_count(&rows).ok_or_else(|| {
            RepoError::invalid_input(format!("topic count query returned no `{USER_TOPICS_COLUMN}`"))
        })?;

        self.cache
            .put(&sql, CachedQuery::new(rows, vec![self.tables.topics()]))?;
        debug!(user_id, topics = count, "Cached topic count");

        Ok(count)
    }
}

// Counts arrive as JSON numbers from the database but may be strings in
// entries written by other clients of a shared cache.
fn topic_count(rows: &[QueryRow]) -> Option<i64> {
    match rows.first()?.get(USER_TOPICS_COLUMN)? {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}
