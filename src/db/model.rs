//! Row types returned by the review repository.
//!
//! Rows mirror the table layout; conversion into domain types validates the
//! text-encoded user id and the rating range.

use chrono::{DateTime, Utc};

use crate::model::{Review, UserId};
use crate::store::StoreError;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReviewRow {
    pub id: i64,
    pub rental_id: i64,
    pub user_id: String,
    pub rating: Option<i64>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<ReviewRow> for Review {
    type Error = StoreError;

    fn try_from(row: ReviewRow) -> Result<Self, Self::Error> {
        let author_id: UserId = row
            .user_id
            .parse()
            .map_err(|e| StoreError::Invalid(format!("review {} has bad user_id: {}", row.id, e)))?;
        let rating = row
            .rating
            .map(|r| {
                u8::try_from(r)
                    .ok()
                    .filter(|r| (1..=5).contains(r))
                    .ok_or_else(|| StoreError::Invalid(format!("review {} has rating {}", row.id, r)))
            })
            .transpose()?;
        Ok(Review {
            id: row.id,
            listing_id: row.rental_id,
            author_id,
            rating,
            comment: row.comment,
            created_at: row.created_at,
        })
    }
}
