//! Postgres-backed repository implementations.

mod queries;
mod ranks;
mod users;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::cache::TableNames;

/// Board tables are addressed through the configured prefix, so queries are
/// built at runtime rather than checked at compile time.
#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
    tables: TableNames,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool, tables: TableNames) -> Self {
        Self {
            pool: Arc::new(pool),
            tables,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }
}
