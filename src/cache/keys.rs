//! Cache key definitions.
//!
//! Cached query results are keyed by their literal SQL text, so every call
//! site that builds the same text shares one entry. Eviction can target a
//! single query or a whole table bucket.

use std::fmt;

use crate::domain::types::TopicVisibility;

/// Column alias carrying the topic count in [`user_topics_query`] results.
pub const USER_TOPICS_COLUMN: &str = "user_topics";

const TABLE_BUCKET_PREFIX: &str = "sql_";
pub const DEFAULT_TABLE_PREFIX: &str = "phpbb_";

/// Resolves board table names from the deployment's table prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    prefix: String,
}

impl TableNames {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn topics(&self) -> String {
        format!("{}topics", self.prefix)
    }

    pub fn users(&self) -> String {
        format!("{}users", self.prefix)
    }

    pub fn ranks(&self) -> String {
        format!("{}ranks", self.prefix)
    }
}

impl Default for TableNames {
    fn default() -> Self {
        Self::new(DEFAULT_TABLE_PREFIX)
    }
}

/// Literal query counting a member's approved topics.
///
/// The output depends only on `tables` and `user_id`, so writers and readers in
/// any process that share a cache backend address the same entry.
pub fn user_topics_query(tables: &TableNames, user_id: i64) -> String {
    format!(
        "SELECT COUNT(topic_poster) AS {USER_TOPICS_COLUMN} FROM {} WHERE topic_poster = {user_id} AND topic_visibility = {}",
        tables.topics(),
        TopicVisibility::Approved.code()
    )
}

/// Addresses cache entries for removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// One cached result, identified by its query text.
    Query(String),
    /// Every cached result that reads from the named table.
    Table(String),
}

impl CacheKey {
    pub fn query(sql: impl Into<String>) -> Self {
        Self::Query(sql.into())
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self::Table(name.into())
    }

    /// The shared bucket holding all cached topic queries.
    pub fn topics_bucket(tables: &TableNames) -> Self {
        Self::Table(tables.topics())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Query(sql) => f.write_str(sql),
            CacheKey::Table(table) => write!(f, "{TABLE_BUCKET_PREFIX}{table}"),
        }
    }
}
