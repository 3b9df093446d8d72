//! Per-listing rating aggregates derived from the full review collection.

use std::collections::HashMap;

use crate::model::{Listing, ListingId, ListingWithStats, Review};

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    sum: u64,
    count: usize,
}

/// Attach `average_rating` and `review_count` to every listing, keeping the
/// listing order. Unrated reviews are skipped and reviews for listings that
/// are not in `listings` are ignored.
pub fn with_stats(listings: &[Listing], reviews: &[Review]) -> Vec<ListingWithStats> {
    let mut tallies: HashMap<ListingId, Tally> = HashMap::new();
    for review in reviews {
        let Some(rating) = review.rating else {
            continue;
        };
        let tally = tallies.entry(review.listing_id).or_default();
        tally.sum += u64::from(rating);
        tally.count += 1;
    }

    listings
        .iter()
        .map(|listing| {
            let tally = tallies.get(&listing.id).copied().unwrap_or_default();
            ListingWithStats {
                listing: listing.clone(),
                average_rating: average(tally),
                review_count: tally.count,
            }
        })
        .collect()
}

fn average(tally: Tally) -> Option<f64> {
    if tally.count == 0 {
        return None;
    }
    let mean = tally.sum as f64 / tally.count as f64;
    Some((mean * 10.0).round() / 10.0)
}

/// Group reviews by listing id, keeping input order inside each group.
pub fn reviews_by_listing(reviews: &[Review]) -> HashMap<ListingId, Vec<&Review>> {
    let mut grouped: HashMap<ListingId, Vec<&Review>> = HashMap::new();
    for review in reviews {
        grouped.entry(review.listing_id).or_default().push(review);
    }
    grouped
}
