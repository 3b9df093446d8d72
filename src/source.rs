//! Listing sources: a CSV export on disk or the hosted `rentals` table.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, instrument};

use crate::model::{parse_count, Listing, ListingId};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read listings file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse listings CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    InvalidUrl(String),
    #[error("listing source returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

#[async_trait]
pub trait ListingSource: Send + Sync {
    async fn load(&self) -> Result<Vec<Listing>, SourceError>;
}

/// Listings read from a CSV file with a header row.
#[derive(Debug, Clone)]
pub struct CsvListingSource {
    path: PathBuf,
}

impl CsvListingSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ListingSource for CsvListingSource {
    #[instrument(skip_all, fields(path = %self.path.display()))]
    async fn load(&self) -> Result<Vec<Listing>, SourceError> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| SourceError::Io {
                path: self.path.clone(),
                source,
            })?;
        let listings = parse_csv(&content)?;
        info!(count = listings.len(), "loaded listings from CSV");
        Ok(listings)
    }
}

/// Raw CSV row; every column is text and may be missing.
#[derive(Debug, Default, Deserialize)]
struct CsvRow {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    bedrooms: Option<String>,
    #[serde(default)]
    bedroom_category: Option<String>,
    #[serde(default)]
    unit_or_number: Option<String>,
    #[serde(default)]
    property_name: Option<String>,
    #[serde(default, rename = "rent_from_ZAR_per_day")]
    rent_from_zar_per_day: Option<String>,
    #[serde(default)]
    website: Option<String>,
    #[serde(default)]
    max_persons: Option<String>,
    #[serde(default)]
    wifi_included: Option<String>,
    #[serde(default)]
    dstv_mentioned: Option<String>,
    #[serde(default)]
    smart_tv_mentioned: Option<String>,
    #[serde(default)]
    pool_mentioned: Option<String>,
    #[serde(default)]
    braai_mentioned: Option<String>,
    #[serde(default)]
    jetty_mentioned: Option<String>,
    #[serde(default)]
    pets_policy: Option<String>,
    #[serde(default)]
    linen_mentioned: Option<String>,
    #[serde(default)]
    towels_mentioned: Option<String>,
    #[serde(default)]
    beach_towels_mentioned: Option<String>,
    #[serde(default)]
    garage_availability_note: Option<String>,
    #[serde(default)]
    unavailability_note: Option<String>,
    #[serde(default)]
    domestic_service_note: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    raw_text: Option<String>,
}

impl CsvRow {
    fn into_listing(self, fallback_id: ListingId) -> Listing {
        let id = self
            .id
            .as_deref()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(fallback_id);
        Listing {
            id,
            bedrooms: self.bedrooms.as_deref().and_then(parse_count),
            bedroom_category: non_empty(self.bedroom_category),
            unit_or_number: non_empty(self.unit_or_number),
            property_name: non_empty(self.property_name),
            rent_from_zar_per_day: non_empty(self.rent_from_zar_per_day),
            website: non_empty(self.website),
            max_persons: non_empty(self.max_persons),
            wifi_included: non_empty(self.wifi_included),
            dstv_mentioned: non_empty(self.dstv_mentioned),
            smart_tv_mentioned: non_empty(self.smart_tv_mentioned),
            pool_mentioned: non_empty(self.pool_mentioned),
            braai_mentioned: non_empty(self.braai_mentioned),
            jetty_mentioned: non_empty(self.jetty_mentioned),
            pets_policy: non_empty(self.pets_policy),
            linen_mentioned: non_empty(self.linen_mentioned),
            towels_mentioned: non_empty(self.towels_mentioned),
            beach_towels_mentioned: non_empty(self.beach_towels_mentioned),
            garage_availability_note: non_empty(self.garage_availability_note),
            unavailability_note: non_empty(self.unavailability_note),
            domestic_service_note: non_empty(self.domestic_service_note),
            description: non_empty(self.description),
            raw_text: non_empty(self.raw_text),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse CSV text into listings. Rows without a property name are dropped;
/// rows without a numeric `id` column are numbered by position (1-based).
pub fn parse_csv(content: &str) -> Result<Vec<Listing>, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let mut listings = Vec::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;
        let named = row
            .property_name
            .as_deref()
            .map(|name| !name.trim().is_empty())
            .unwrap_or(false);
        if !named {
            continue;
        }
        let position = listings.len() as ListingId + 1;
        listings.push(row.into_listing(position));
    }
    Ok(listings)
}
