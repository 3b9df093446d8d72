use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use rental_reviews::browse::{self, SortOption};
use rental_reviews::config::{self, ListingOrigin, StoreBackend};
use rental_reviews::db::SqliteStore;
use rental_reviews::source::{CsvListingSource, ListingSource};
use rental_reviews::stats;
use rental_reviews::store::ReviewStore;
use rental_reviews::supabase::SupabaseClient;

#[derive(Debug, Parser)]
#[command(about = "Dump listings with their rating aggregates as JSON.")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// default, price-asc or price-desc
    #[arg(long, default_value = "default")]
    sort: SortOption,

    #[arg(long)]
    bedrooms: Option<u32>,

    /// Write to this file instead of stdout
    #[arg(long)]
    out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let client = match (cfg.listings.origin, cfg.store.backend) {
        (ListingOrigin::Csv, StoreBackend::Sqlite) => None,
        _ => Some(SupabaseClient::from_config(&cfg)?),
    };

    let listings = match (&client, cfg.listings.origin) {
        (Some(client), ListingOrigin::Table) => client.load().await,
        _ => {
            let path = cfg.listings.csv_path.clone().unwrap_or_default();
            CsvListingSource::new(path).load().await
        }
    }
    .context("failed to load listings")?;

    let store: Arc<dyn ReviewStore> = match (&client, cfg.store.backend) {
        (Some(client), StoreBackend::Supabase) => Arc::new(client.clone()),
        _ => Arc::new(SqliteStore::connect(&cfg.database_url()).await?),
    };
    let reviews = store.read_all().await.context("failed to read reviews")?;

    let items = stats::with_stats(&listings, &reviews);
    let items = browse::filter_by_bedrooms(items, args.bedrooms);
    // Nobody is signed in here, so rating sorts fall back to source order.
    let items = browse::sort_listings(items, args.sort, &Default::default());

    let json = serde_json::to_string_pretty(&items)?;
    match args.out {
        Some(path) => {
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("wrote {} listings to {}", items.len(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}
