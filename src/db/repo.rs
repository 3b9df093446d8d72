use super::model::ReviewRow;
use crate::model::{Review, ReviewUpsert};
use crate::store::StoreError;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool, StoreError> {
    let normalized = prepare_sqlite_url(database_url);
    let in_memory = normalized.contains(":memory:") || normalized.contains("mode=memory");
    let options = SqliteConnectOptions::from_str(&normalized)?.create_if_missing(true);
    // Every connection to an in-memory URL would see its own empty database.
    let max_connections = if in_memory { 1 } else { 4 };
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;
    if !in_memory {
        sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    }
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);
    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<(), StoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn list_reviews(pool: &Pool) -> Result<Vec<Review>, StoreError> {
    let rows: Vec<ReviewRow> = sqlx::query_as(
        "SELECT id, rental_id, user_id, rating, comment, created_at FROM reviews ORDER BY id",
    )
    .fetch_all(pool)
    .await?;
    rows.into_iter().map(Review::try_from).collect()
}

/// Insert or replace the review for `(rental_id, user_id)`. Values are
/// normalized the way the hosted backend stores them: a blank comment and a
/// rating outside 1..=5 are stored as NULL. `created_at` keeps the first write.
#[instrument(skip_all, fields(listing_id = review.listing_id))]
pub async fn upsert_review(pool: &Pool, review: &ReviewUpsert) -> Result<i64, StoreError> {
    let rating = review
        .rating
        .filter(|r| (1..=5).contains(r))
        .map(i64::from);
    let comment = review
        .comment
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO reviews (rental_id, user_id, rating, comment, created_at) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(rental_id, user_id) DO UPDATE SET rating = excluded.rating, comment = excluded.comment \
         RETURNING id",
    )
    .bind(review.listing_id)
    .bind(review.author_id.to_string())
    .bind(rating)
    .bind(comment)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(id)
}
