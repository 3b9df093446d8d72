//! Local SQLite review store.
//!
//! - `model`: row types and their conversion into domain reviews.
//! - `repo`: SQL-only functions over the pool.
//!
//! [`SqliteStore`] wraps the repository behind the [`ReviewStore`] trait so the
//! sync controller can run against a local database instead of the hosted one.

use async_trait::async_trait;

use crate::model::{Review, ReviewUpsert};
use crate::store::{ReviewStore, StoreError};

pub mod model;
pub mod repo;

pub use repo::*;

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: Pool,
}

impl SqliteStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) and migrate the database at `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = init_pool(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl ReviewStore for SqliteStore {
    async fn read_all(&self) -> Result<Vec<Review>, StoreError> {
        list_reviews(&self.pool).await
    }

    async fn upsert(&self, review: &ReviewUpsert) -> Result<(), StoreError> {
        upsert_review(&self.pool, review).await.map(|_| ())
    }
}
