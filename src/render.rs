//! Plain-text views of the catalog for the terminal.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::browse::{self, format_price, star_bar};
use crate::model::{ListingId, ListingWithStats, Review, ReviewDraft};

/// Reviews listed under a card before collapsing into "+N more".
pub const PREVIEW_LIMIT: usize = 3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Card,
    List,
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViewMode::Card => "card",
            ViewMode::List => "list",
        })
    }
}

#[derive(Debug, Error)]
#[error("unknown view '{0}' (expected card or list)")]
pub struct ParseViewError(String);

impl FromStr for ViewMode {
    type Err = ParseViewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "card" => Ok(ViewMode::Card),
            "list" => Ok(ViewMode::List),
            other => Err(ParseViewError(other.to_string())),
        }
    }
}

/// Everything a view needs besides the listings themselves.
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    pub reviews: &'a HashMap<ListingId, Vec<&'a Review>>,
    /// The signed-in user's drafts; `None` when signed out.
    pub drafts: Option<&'a HashMap<ListingId, ReviewDraft>>,
    pub nights: u32,
}

/// "★ 4.0 (3 reviews)", or "No ratings yet" when nothing is rated.
pub fn rating_summary(item: &ListingWithStats) -> String {
    let noun = if item.review_count == 1 { "review" } else { "reviews" };
    match item.average_rating {
        Some(avg) => format!("★ {:.1} ({} {})", avg, item.review_count, noun),
        None if item.review_count > 0 => format!("No ratings yet ({} {})", item.review_count, noun),
        None => "No ratings yet".to_string(),
    }
}

fn bedrooms_label(item: &ListingWithStats) -> Option<String> {
    item.listing.bedrooms.map(|n| match n {
        1 => "1 bedroom".to_string(),
        n => format!("{} bedrooms", n),
    })
}

pub fn render_card(item: &ListingWithStats, ctx: &RenderContext<'_>) -> String {
    let listing = &item.listing;
    let mut lines = Vec::new();

    let mut heading = listing.title();
    if let Some(beds) = bedrooms_label(item) {
        heading.push_str(" · ");
        heading.push_str(&beds);
    }
    lines.push(heading);

    let mut price = format!("{} / night", format_price(listing.rent_from_zar_per_day.as_deref()));
    let amenities = browse::amenities(listing);
    if !amenities.is_empty() {
        price.push_str(" · ");
        price.push_str(&amenities.join(", "));
    }
    lines.push(price);
    lines.push(rating_summary(item));

    let nights = browse::clamp_nights(ctx.nights);
    if browse::parse_price(listing.rent_from_zar_per_day.as_deref()) > 0 {
        lines.push(format!(
            "{} night{}: {}",
            nights,
            if nights == 1 { "" } else { "s" },
            format_price(Some(&browse::stay_cost(listing, nights).to_string()))
        ));
    }

    if let Some(max) = listing.max_persons.as_deref().filter(|m| !m.trim().is_empty()) {
        lines.push(format!("Sleeps {}", max.trim()));
    }
    if let Some(website) = listing.website.as_deref().filter(|w| !w.trim().is_empty()) {
        lines.push(website.trim().to_string());
    }

    match ctx.drafts {
        Some(drafts) => {
            let draft = drafts.get(&listing.id).cloned().unwrap_or_default();
            lines.push(format!("Your rating: {}", star_bar(draft.rating)));
            if !draft.comment.trim().is_empty() {
                lines.push(format!("Your comment: {}", draft.comment.trim()));
            }
        }
        None => lines.push("Sign in to rate and review".to_string()),
    }

    let reviews = ctx
        .reviews
        .get(&listing.id)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    let preview = browse::review_preview(reviews, PREVIEW_LIMIT);
    for review in &preview.shown {
        let comment = review.comment.as_deref().unwrap_or("").trim();
        lines.push(format!("  {} {}", star_bar(review.rating.unwrap_or(0)), comment).trim_end().to_string());
    }
    if preview.more > 0 {
        lines.push(format!("  +{} more", preview.more));
    }

    lines.join("\n")
}

/// One compact line per listing.
pub fn render_row(item: &ListingWithStats, ctx: &RenderContext<'_>) -> String {
    let listing = &item.listing;
    let beds = listing
        .bedrooms
        .map(|n| format!("{} bd", n))
        .unwrap_or_else(|| "- bd".to_string());
    let mut row = format!(
        "#{:<4} {:<32} {:>6} {:>12}  {}",
        listing.id,
        listing.title(),
        beds,
        format_price(listing.rent_from_zar_per_day.as_deref()),
        rating_summary(item)
    );
    if let Some(draft) = ctx.drafts.and_then(|d| d.get(&listing.id)) {
        if draft.rating > 0 {
            row.push_str("  mine: ");
            row.push_str(&star_bar(draft.rating));
        }
    }
    row
}

pub fn render_listings(items: &[ListingWithStats], view: ViewMode, ctx: &RenderContext<'_>) -> String {
    if items.is_empty() {
        return "No listings match.".to_string();
    }
    match view {
        ViewMode::Card => items
            .iter()
            .map(|item| render_card(item, ctx))
            .collect::<Vec<_>>()
            .join("\n\n"),
        ViewMode::List => items
            .iter()
            .map(|item| render_row(item, ctx))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
