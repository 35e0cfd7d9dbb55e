use async_trait::async_trait;

use crate::{
    application::repos::{RepoError, UsersRepo},
    domain::users::UserRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct UserRow {
    user_id: i64,
    user_type: i16,
    user_ip: String,
    user_regdate: i64,
    user_posts: i64,
    user_rank: i64,
    user_timezone: String,
    user_dateformat: String,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.user_id,
            user_type: row.user_type,
            ip: row.user_ip,
            registered_at: row.user_regdate,
            posts: row.user_posts,
            rank_id: row.user_rank,
            timezone: row.user_timezone,
            date_format: row.user_dateformat,
        }
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn find_user(&self, user_id: i64) -> Result<Option<UserRecord>, RepoError> {
        let sql = format!(
            "SELECT user_id, user_type, user_ip, user_regdate, user_posts, user_rank, \
             user_timezone, user_dateformat FROM {} WHERE user_id = $1",
            self.tables().users()
        );

        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }
}
