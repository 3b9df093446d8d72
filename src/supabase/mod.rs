//! Hosted backend adapter: PostgREST tables for listings and reviews, GoTrue
//! for accounts.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::model::{Listing, Review, ReviewUpsert};
use crate::source::{ListingSource, SourceError};
use crate::store::{ReviewStore, StoreError};

pub mod auth;
pub mod model;

pub use auth::{AuthError, SupabaseAuth};

const REVIEW_COLUMNS: &str = "id,rental_id,user_id,rating,comment,created_at";
const REVIEW_CONFLICT_KEY: &str = "rental_id,user_id";

#[derive(Clone)]
pub struct SupabaseClient {
    http: Client,
    base_url: Url,
    anon_key: String,
    access_token: Arc<RwLock<Option<String>>>,
}

impl fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl SupabaseClient {
    pub fn new(base_url: Url, anon_key: String) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("rental-reviews/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url,
            anon_key,
            access_token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let url = Url::parse(&cfg.supabase.url)?;
        Ok(Self::new(url, cfg.supabase.anon_key.clone())?)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Token sent as the bearer credential; the anon key when signed out.
    pub fn set_access_token(&self, token: Option<String>) {
        let mut guard = self
            .access_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = token;
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn bearer(&self) -> String {
        let token = self.access_token().unwrap_or_else(|| self.anon_key.clone());
        format!("Bearer {}", token)
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, String> {
        self.base_url
            .join(path)
            .map_err(|e| format!("invalid Supabase URL: {}", e))
    }

    pub(crate) fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.anon_key)
            .header("Authorization", self.bearer())
    }

    /// `GET rest/v1/reviews` selecting every review column.
    pub fn build_read_reviews(&self) -> Result<reqwest::Request, StoreError> {
        let mut url = self.endpoint("rest/v1/reviews").map_err(StoreError::Invalid)?;
        url.query_pairs_mut().append_pair("select", REVIEW_COLUMNS);
        Ok(self
            .request(Method::GET, url)
            .header("Accept", "application/json")
            .build()?)
    }

    /// `POST rest/v1/reviews` that merges on the `(rental_id, user_id)` key.
    pub fn build_upsert_review(&self, review: &ReviewUpsert) -> Result<reqwest::Request, StoreError> {
        let mut url = self.endpoint("rest/v1/reviews").map_err(StoreError::Invalid)?;
        url.query_pairs_mut()
            .append_pair("on_conflict", REVIEW_CONFLICT_KEY);
        Ok(self
            .request(Method::POST, url)
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(review)
            .build()?)
    }

    /// `GET rest/v1/rentals` ordered by id.
    pub fn build_read_listings(&self) -> Result<reqwest::Request, SourceError> {
        let mut url = self
            .endpoint("rest/v1/rentals")
            .map_err(SourceError::InvalidUrl)?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("order", "id");
        Ok(self
            .request(Method::GET, url)
            .header("Accept", "application/json")
            .build()?)
    }

    /// Send a request and turn any non-2xx reply into a [`RestFailure`].
    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, RestFailure> {
        debug!(method = %request.method(), url = %request.url(), "supabase request");
        let res = self.http.execute(request).await.map_err(RestFailure::Http)?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            warn!(%status, %body, "supabase request failed");
            return Err(RestFailure::Status { status, body });
        }
        Ok(res)
    }
}

/// A PostgREST call that failed before its body was decoded.
#[derive(Debug)]
enum RestFailure {
    Http(reqwest::Error),
    Status { status: StatusCode, body: String },
}

impl From<RestFailure> for StoreError {
    fn from(failure: RestFailure) -> Self {
        match failure {
            RestFailure::Http(err) => StoreError::Http(err),
            RestFailure::Status { status, body } => StoreError::Status { status, body },
        }
    }
}

impl From<RestFailure> for SourceError {
    fn from(failure: RestFailure) -> Self {
        match failure {
            RestFailure::Http(err) => SourceError::Http(err),
            RestFailure::Status { status, body } => SourceError::Status { status, body },
        }
    }
}

#[async_trait]
impl ReviewStore for SupabaseClient {
    #[instrument(skip_all)]
    async fn read_all(&self) -> Result<Vec<Review>, StoreError> {
        let request = self.build_read_reviews()?;
        let reviews: Vec<Review> = self.send(request).await?.json().await?;
        debug!(count = reviews.len(), "fetched reviews");
        Ok(reviews)
    }

    #[instrument(skip_all, fields(listing_id = review.listing_id))]
    async fn upsert(&self, review: &ReviewUpsert) -> Result<(), StoreError> {
        let request = self.build_upsert_review(review)?;
        self.send(request).await?;
        info!("review upserted");
        Ok(())
    }
}

#[async_trait]
impl ListingSource for SupabaseClient {
    #[instrument(skip_all)]
    async fn load(&self) -> Result<Vec<Listing>, SourceError> {
        let request = self.build_read_listings()?;
        let listings: Vec<Listing> = self.send(request).await?.json().await?;
        info!(count = listings.len(), "loaded listings from rentals table");
        Ok(listings)
    }
}
