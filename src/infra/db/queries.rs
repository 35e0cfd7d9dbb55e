use async_trait::async_trait;
use serde_json::Value;

use crate::application::repos::{QueryRepo, QueryRow, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl QueryRepo for PostgresRepositories {
    async fn fetch_rows(&self, sql: &str) -> Result<Vec<QueryRow>, RepoError> {
        // Each row comes back as one JSON object keyed by column name, so
        // arbitrary query text can be cached without knowing its shape.
        let wrapped = format!("SELECT row_to_json(q) AS row FROM ({sql}) AS q");

        let values = sqlx::query_scalar::<_, Value>(&wrapped)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        values
            .into_iter()
            .map(|value| match value {
                Value::Object(row) => Ok(row),
                other => Err(RepoError::invalid_input(format!(
                    "expected a JSON object per row, got `{other}`"
                ))),
            })
            .collect()
    }
}
