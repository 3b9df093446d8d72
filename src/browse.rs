//! Sorting, filtering and formatting helpers used when presenting listings.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::{Listing, ListingId, ListingWithStats, Review, ReviewDraft};

static NON_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").expect("valid regex"));

pub const MIN_NIGHTS: u32 = 1;
pub const MAX_NIGHTS: u32 = 365;
pub const MAX_STARS: u8 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOption {
    #[default]
    Default,
    PriceAsc,
    PriceDesc,
    RatingDesc,
    RatingAsc,
}

impl SortOption {
    pub const ALL: [SortOption; 5] = [
        SortOption::Default,
        SortOption::PriceAsc,
        SortOption::PriceDesc,
        SortOption::RatingDesc,
        SortOption::RatingAsc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortOption::Default => "default",
            SortOption::PriceAsc => "price-asc",
            SortOption::PriceDesc => "price-desc",
            SortOption::RatingDesc => "rating-desc",
            SortOption::RatingAsc => "rating-asc",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SortOption::Default => "Default order",
            SortOption::PriceAsc => "Price: low to high",
            SortOption::PriceDesc => "Price: high to low",
            SortOption::RatingDesc => "My rating: high to low",
            SortOption::RatingAsc => "My rating: low to high",
        }
    }
}

impl fmt::Display for SortOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown sort option '{0}' (expected default, price-asc, price-desc, rating-desc or rating-asc)")]
pub struct ParseSortError(String);

impl FromStr for SortOption {
    type Err = ParseSortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SortOption::ALL
            .into_iter()
            .find(|opt| opt.as_str() == s.trim())
            .ok_or_else(|| ParseSortError(s.to_string()))
    }
}

/// Numeric daily price: every non-digit is dropped, then parsed. Missing or
/// unparsable text counts as 0.
pub fn parse_price(raw: Option<&str>) -> u64 {
    let digits = NON_DIGITS.replace_all(raw.unwrap_or(""), "");
    digits.parse().unwrap_or(0)
}

/// Order listings for display. Sorting is stable; rating sorts use the signed
/// in user's own draft rating, treating a missing draft as 0.
pub fn sort_listings(
    mut items: Vec<ListingWithStats>,
    sort: SortOption,
    drafts: &HashMap<ListingId, ReviewDraft>,
) -> Vec<ListingWithStats> {
    let my_rating = |id: ListingId| drafts.get(&id).map(|d| d.rating).unwrap_or(0);
    let price = |item: &ListingWithStats| parse_price(item.listing.rent_from_zar_per_day.as_deref());
    match sort {
        SortOption::Default => {}
        SortOption::PriceAsc => items.sort_by_key(|item| price(item)),
        SortOption::PriceDesc => items.sort_by(|a, b| price(b).cmp(&price(a))),
        SortOption::RatingDesc => {
            items.sort_by(|a, b| my_rating(b.listing.id).cmp(&my_rating(a.listing.id)))
        }
        SortOption::RatingAsc => items.sort_by_key(|item| my_rating(item.listing.id)),
    }
    items
}

/// Distinct bedroom counts present in the catalog, ascending.
pub fn bedroom_options(items: &[ListingWithStats]) -> Vec<u32> {
    items
        .iter()
        .filter_map(|item| item.listing.bedrooms)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Keep listings with exactly `bedrooms` bedrooms; `None` keeps everything.
pub fn filter_by_bedrooms(
    items: Vec<ListingWithStats>,
    bedrooms: Option<u32>,
) -> Vec<ListingWithStats> {
    match bedrooms {
        None => items,
        Some(n) => items
            .into_iter()
            .filter(|item| item.listing.bedrooms == Some(n))
            .collect(),
    }
}

/// "R 12,345" for a parsable price, the raw text otherwise, and an em dash
/// when the price is missing.
pub fn format_price(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return "—".to_string();
    };
    let digits = NON_DIGITS.replace_all(raw, "");
    match digits.parse::<u64>() {
        Ok(n) => format!("R {}", group_thousands(n)),
        Err(_) => raw.to_string(),
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Amenity columns hold free text; only a case-insensitive "true" counts.
pub fn is_truthy(flag: Option<&str>) -> bool {
    flag.map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn amenities(listing: &Listing) -> Vec<&'static str> {
    [
        (listing.wifi_included.as_deref(), "Wi-Fi"),
        (listing.pool_mentioned.as_deref(), "Pool"),
        (listing.braai_mentioned.as_deref(), "Braai"),
        (listing.smart_tv_mentioned.as_deref(), "Smart TV"),
    ]
    .into_iter()
    .filter(|(flag, _)| is_truthy(*flag))
    .map(|(_, label)| label)
    .collect()
}

pub fn clamp_nights(nights: u32) -> u32 {
    nights.clamp(MIN_NIGHTS, MAX_NIGHTS)
}

/// Daily price times the number of nights (clamped to 1..=365).
pub fn stay_cost(listing: &Listing, nights: u32) -> u64 {
    parse_price(listing.rent_from_zar_per_day.as_deref()).saturating_mul(u64::from(clamp_nights(nights)))
}

/// Five-character star bar, e.g. "★★★☆☆".
pub fn star_bar(rating: u8) -> String {
    let filled = rating.min(MAX_STARS) as usize;
    let mut bar = "★".repeat(filled);
    bar.push_str(&"☆".repeat(MAX_STARS as usize - filled));
    bar
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewPreview<'a> {
    pub shown: Vec<&'a Review>,
    pub more: usize,
}

/// First `limit` reviews of a listing and how many were left out.
pub fn review_preview<'a>(reviews: &[&'a Review], limit: usize) -> ReviewPreview<'a> {
    ReviewPreview {
        shown: reviews.iter().take(limit).copied().collect(),
        more: reviews.len().saturating_sub(limit),
    }
}
