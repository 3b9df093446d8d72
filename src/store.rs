use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Review, ReviewUpsert};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("review store returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("invalid review data: {0}")]
    Invalid(String),
}

/// Durable `(listing, user) -> {rating, comment}` storage.
///
/// `upsert` is keyed on `(listing_id, author_id)`: a second upsert for the same
/// pair replaces the first, so repeating identical input is harmless.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn read_all(&self) -> Result<Vec<Review>, StoreError>;

    async fn upsert(&self, review: &ReviewUpsert) -> Result<(), StoreError>;
}
