use chrono::Utc;
use std::collections::HashMap;
use tempfile::tempdir;

use rental_reviews::browse::{self, SortOption};
use rental_reviews::model::{ListingId, ListingWithStats, Review, ReviewDraft, UserId};
use rental_reviews::render::{self, RenderContext, ViewMode};
use rental_reviews::source::{CsvListingSource, ListingSource};
use rental_reviews::stats;

const CATALOG: &str = "\
property_name,unit_or_number,bedrooms,rent_from_ZAR_per_day,wifi_included,pool_mentioned
Sea View,12,3,\"R 2,000\",TRUE,false
Dune House,,2,POA,false,true
,,4,R 100,,
Harbour Loft,3B,2,R 950,true,
Fynbos Cottage,,3,\"R 1,250\",,
";

fn review(id: i64, listing_id: ListingId, author: UserId, rating: Option<u8>) -> Review {
    Review {
        id,
        listing_id,
        author_id: author,
        rating,
        comment: None,
        created_at: Utc::now(),
    }
}

fn ids(items: &[ListingWithStats]) -> Vec<ListingId> {
    items.iter().map(|i| i.listing.id).collect()
}

async fn load_catalog() -> Vec<rental_reviews::model::Listing> {
    let td = tempdir().unwrap();
    let path = td.path().join("rentals.csv");
    std::fs::write(&path, CATALOG).unwrap();
    CsvListingSource::new(&path).load().await.unwrap()
}

#[tokio::test]
async fn catalog_filters_and_sorts_with_aggregates() {
    let listings = load_catalog().await;
    // The unnamed row is skipped and numbering stays contiguous.
    assert_eq!(listings.len(), 4);
    assert_eq!(
        listings.iter().map(|l| l.title()).collect::<Vec<_>>(),
        vec!["12 Sea View", "Dune House", "3B Harbour Loft", "Fynbos Cottage"]
    );

    let me = UserId::new_v4();
    let other = UserId::new_v4();
    let reviews = vec![
        review(1, 1, me, Some(3)),
        review(2, 1, other, Some(4)),
        review(3, 3, other, Some(5)),
        review(4, 3, me, None),
        review(5, 99, other, Some(1)),
    ];
    let items = stats::with_stats(&listings, &reviews);
    assert_eq!(items[0].average_rating, Some(3.5));
    assert_eq!(items[0].review_count, 2);
    assert_eq!(items[2].average_rating, Some(5.0));
    assert_eq!(items[2].review_count, 1);
    assert_eq!(items[1].average_rating, None);

    assert_eq!(browse::bedroom_options(&items), vec![2, 3]);

    let two_beds = browse::filter_by_bedrooms(items.clone(), Some(2));
    assert_eq!(ids(&two_beds), vec![2, 3]);
    assert_eq!(ids(&browse::filter_by_bedrooms(items.clone(), None)), vec![1, 2, 3, 4]);
    assert!(browse::filter_by_bedrooms(items.clone(), Some(7)).is_empty());

    let none = HashMap::new();
    let by_price = browse::sort_listings(items.clone(), SortOption::PriceAsc, &none);
    // "POA" has no digits and sorts as 0.
    assert_eq!(ids(&by_price), vec![2, 3, 4, 1]);
    let by_price_desc = browse::sort_listings(items.clone(), SortOption::PriceDesc, &none);
    assert_eq!(ids(&by_price_desc), vec![1, 4, 3, 2]);

    let drafts: HashMap<ListingId, ReviewDraft> = [
        (3, ReviewDraft { rating: 5, comment: String::new() }),
        (1, ReviewDraft { rating: 2, comment: String::new() }),
    ]
    .into_iter()
    .collect();
    let by_mine = browse::sort_listings(items.clone(), SortOption::RatingDesc, &drafts);
    assert_eq!(ids(&by_mine), vec![3, 1, 2, 4]);
    let by_mine_asc = browse::sort_listings(items, SortOption::RatingAsc, &drafts);
    assert_eq!(ids(&by_mine_asc), vec![2, 4, 1, 3]);
}

#[tokio::test]
async fn filtered_catalog_renders_in_both_views() {
    let listings = load_catalog().await;
    let items = stats::with_stats(&listings, &[]);
    let items = browse::filter_by_bedrooms(items, Some(3));
    let items = browse::sort_listings(items, SortOption::PriceAsc, &HashMap::new());

    let by_listing = HashMap::new();
    let ctx = RenderContext {
        reviews: &by_listing,
        drafts: None,
        nights: 0,
    };

    let cards = render::render_listings(&items, ViewMode::Card, &ctx);
    let first = cards.split("\n\n").next().unwrap();
    assert!(first.starts_with("Fynbos Cottage · 3 bedrooms"));
    // Nights are clamped to at least one.
    assert!(first.contains("1 night: R 1,250"));
    assert!(cards.contains("R 2,000 / night · Wi-Fi"));

    let rows = render::render_listings(&items, ViewMode::List, &ctx);
    assert_eq!(rows.lines().count(), 2);
    assert!(rows.lines().all(|l| l.contains("No ratings yet")));
}
