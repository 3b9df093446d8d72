use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type ListingId = i64;

/// Authenticated user id as issued by the auth provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// One holiday rental as supplied by the listing source. Every descriptive
/// column is free text; only `bedrooms` is parsed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: ListingId,
    #[serde(default, deserialize_with = "lenient_count")]
    pub bedrooms: Option<u32>,
    #[serde(default)]
    pub bedroom_category: Option<String>,
    #[serde(default)]
    pub unit_or_number: Option<String>,
    #[serde(default)]
    pub property_name: Option<String>,
    #[serde(default, rename = "rent_from_ZAR_per_day")]
    pub rent_from_zar_per_day: Option<String>,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default)]
    pub max_persons: Option<String>,
    #[serde(default)]
    pub wifi_included: Option<String>,
    #[serde(default)]
    pub dstv_mentioned: Option<String>,
    #[serde(default)]
    pub smart_tv_mentioned: Option<String>,
    #[serde(default)]
    pub pool_mentioned: Option<String>,
    #[serde(default)]
    pub braai_mentioned: Option<String>,
    #[serde(default)]
    pub jetty_mentioned: Option<String>,
    #[serde(default)]
    pub pets_policy: Option<String>,
    #[serde(default)]
    pub linen_mentioned: Option<String>,
    #[serde(default)]
    pub towels_mentioned: Option<String>,
    #[serde(default)]
    pub beach_towels_mentioned: Option<String>,
    #[serde(default)]
    pub garage_availability_note: Option<String>,
    #[serde(default)]
    pub unavailability_note: Option<String>,
    #[serde(default)]
    pub domestic_service_note: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub raw_text: Option<String>,
}

impl Listing {
    /// Display title, e.g. "12 Sea View" or "Property" when unnamed.
    pub fn title(&self) -> String {
        let name = self.property_name.as_deref().unwrap_or("Property");
        match self.unit_or_number.as_deref().map(str::trim) {
            Some(unit) if !unit.is_empty() => format!("{} {}", unit, name),
            _ => name.to_string(),
        }
    }
}

/// Parse a bedroom count from text; anything that is not a whole number is absent.
pub fn parse_count(raw: &str) -> Option<u32> {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<u32>() {
        return Some(n);
    }
    // "3.0" as exported by spreadsheet tools
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u32::MAX as f64)
        .map(|f| f as u32)
}

fn lenient_count<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumOrText {
        Num(f64),
        Text(String),
    }

    Ok(match Option::<NumOrText>::deserialize(deserializer)? {
        Some(NumOrText::Num(n)) => parse_count(&n.to_string()),
        Some(NumOrText::Text(s)) => parse_count(&s),
        None => None,
    })
}

/// A stored review row. Wire column names follow the hosted schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Review {
    pub id: i64,
    #[serde(rename = "rental_id")]
    pub listing_id: ListingId,
    #[serde(rename = "user_id")]
    pub author_id: UserId,
    #[serde(default, deserialize_with = "rating_in_range")]
    pub rating: Option<u8>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Stored ratings are 1..=5 or absent; anything else is a corrupt row.
fn rating_in_range<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<u8>::deserialize(deserializer)? {
        Some(r) if !(1..=5).contains(&r) => Err(serde::de::Error::custom(format!(
            "rating {} outside 1..=5",
            r
        ))),
        rating => Ok(rating),
    }
}

/// Payload for the keyed upsert on `(rental_id, user_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReviewUpsert {
    #[serde(rename = "rental_id")]
    pub listing_id: ListingId,
    #[serde(rename = "user_id")]
    pub author_id: UserId,
    pub rating: Option<u8>,
    pub comment: Option<String>,
}

impl ReviewUpsert {
    /// Build the upsert for a local draft: rating 0 becomes absent and a blank
    /// comment becomes absent.
    pub fn from_draft(listing_id: ListingId, author_id: UserId, draft: &ReviewDraft) -> Self {
        let comment = draft.comment.trim();
        Self {
            listing_id,
            author_id,
            rating: (draft.rating > 0).then_some(draft.rating),
            comment: (!comment.is_empty()).then(|| comment.to_string()),
        }
    }
}

/// The signed-in user's own rating (0 = unset) and comment for one listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDraft {
    pub rating: u8,
    pub comment: String,
}

impl From<&Review> for ReviewDraft {
    fn from(review: &Review) -> Self {
        Self {
            rating: review.rating.unwrap_or(0),
            comment: review.comment.clone().unwrap_or_default(),
        }
    }
}

/// A listing with its derived rating aggregate. Never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ListingWithStats {
    #[serde(flatten)]
    pub listing: Listing,
    pub average_rating: Option<f64>,
    pub review_count: usize,
}
