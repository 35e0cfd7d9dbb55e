//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::ranks::RankRecord;
use crate::domain::users::UserRecord;

/// One result row keyed by column name.
pub type QueryRow = Map<String, Value>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

/// Executes literal query text against the board database.
#[async_trait]
pub trait QueryRepo: Send + Sync {
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<QueryRow>, RepoError>;
}

#[async_trait]
pub trait RanksRepo: Send + Sync {
    async fn list_ranks(&self) -> Result<Vec<RankRecord>, RepoError>;
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>, RepoError>;
}
