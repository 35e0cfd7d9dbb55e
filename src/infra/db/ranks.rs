use async_trait::async_trait;

use crate::{
    application::repos::{RanksRepo, RepoError},
    domain::ranks::RankRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct RankRow {
    rank_id: i64,
    rank_title: String,
    rank_min: i64,
    rank_special: bool,
}

impl From<RankRow> for RankRecord {
    fn from(row: RankRow) -> Self {
        Self {
            id: row.rank_id,
            title: row.rank_title,
            min_posts: row.rank_min,
            special: row.rank_special,
        }
    }
}

#[async_trait]
impl RanksRepo for PostgresRepositories {
    async fn list_ranks(&self) -> Result<Vec<RankRecord>, RepoError> {
        let sql = format!(
            "SELECT rank_id, rank_title, rank_min, rank_special FROM {} ORDER BY rank_min DESC, rank_id",
            self.tables().ranks()
        );

        let rows = sqlx::query_as::<_, RankRow>(&sql)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(RankRecord::from).collect())
    }
}
