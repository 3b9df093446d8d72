use anyhow::{anyhow, bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use rental_reviews::browse::{self, SortOption};
use rental_reviews::config::{self, Config, ListingOrigin, StoreBackend};
use rental_reviews::db::SqliteStore;
use rental_reviews::model::{ListingId, UserId};
use rental_reviews::render::{self, RenderContext, ViewMode};
use rental_reviews::session::SessionHandle;
use rental_reviews::source::{CsvListingSource, ListingSource};
use rental_reviews::stats;
use rental_reviews::store::ReviewStore;
use rental_reviews::supabase::auth::SignUpOutcome;
use rental_reviews::supabase::{SupabaseAuth, SupabaseClient};
use rental_reviews::sync::SyncController;

#[derive(Debug, Parser)]
#[command(author, version, about = "Browse holiday rentals and keep your own ratings and reviews")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the catalog with rating aggregates
    List {
        /// default, price-asc, price-desc, rating-desc or rating-asc
        #[arg(long, default_value = "default")]
        sort: SortOption,
        /// Only show listings with exactly this many bedrooms
        #[arg(long)]
        bedrooms: Option<u32>,
        /// card or list
        #[arg(long, default_value = "card")]
        view: ViewMode,
        /// Nights used for the stay cost estimate (defaults to app.default_nights)
        #[arg(long)]
        nights: Option<u32>,
        #[command(flatten)]
        identity: Identity,
    },
    /// Rate a listing 1-5; repeating your current rating clears it
    Rate {
        #[arg(long)]
        listing: ListingId,
        #[arg(long)]
        stars: u8,
        #[command(flatten)]
        identity: Identity,
    },
    /// Set your comment on a listing (an empty text clears it)
    Comment {
        #[arg(long)]
        listing: ListingId,
        #[arg(long)]
        text: String,
        #[command(flatten)]
        identity: Identity,
    },
    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
}

#[derive(Debug, Clone, ClapArgs)]
struct Identity {
    /// Account email (hosted backend)
    #[arg(long, requires = "password")]
    email: Option<String>,
    /// Account password (hosted backend)
    #[arg(long, requires = "email")]
    password: Option<String>,
    /// Act as this user id (local SQLite backend only)
    #[arg(long, conflicts_with = "email")]
    user: Option<UserId>,
}

/// Wired-up collaborators for one invocation.
struct Backend {
    listings: Arc<dyn ListingSource>,
    store: Arc<dyn ReviewStore>,
    session: SessionHandle,
    auth: Option<SupabaseAuth>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))
        .with_context(|| format!("failed to load config {}", args.config.display()))?;
    cfg.ensure_dirs()?;

    let backend = connect(&cfg).await?;

    match args.command {
        Command::List {
            sort,
            bedrooms,
            view,
            nights,
            identity,
        } => {
            let nights = nights.unwrap_or(cfg.app.default_nights);
            list(&cfg, &backend, &identity, sort, bedrooms, view, nights).await
        }
        Command::Rate {
            listing,
            stars,
            identity,
        } => {
            sign_in(&backend, &identity).await?;
            let controller = controller(&cfg, &backend).await;
            let rating = controller.set_rating(listing, stars).await?;
            let saved = controller.draft_for(listing);
            if rating == 0 {
                println!("Cleared your rating for listing #{}", listing);
            } else {
                println!("Rated listing #{}: {}", listing, browse::star_bar(saved.rating));
            }
            sign_out(&backend).await;
            Ok(())
        }
        Command::Comment {
            listing,
            text,
            identity,
        } => {
            sign_in(&backend, &identity).await?;
            let controller = controller(&cfg, &backend).await;
            controller.set_comment(listing, text)?;
            controller.flush(listing).await;
            let saved = controller.draft_for(listing);
            if saved.comment.is_empty() {
                println!("Cleared your comment for listing #{}", listing);
            } else {
                println!("Comment for listing #{}: {}", listing, saved.comment);
            }
            sign_out(&backend).await;
            Ok(())
        }
        Command::Signup { email, password } => {
            let auth = backend
                .auth
                .as_ref()
                .ok_or_else(|| anyhow!("sign-up needs store.backend: supabase"))?;
            match auth.sign_up(&email, &password).await? {
                SignUpOutcome::SignedIn(user) => println!("Account created; signed in as {}", user),
                SignUpOutcome::ConfirmationSent(_) => {
                    println!("Check your email to confirm your account")
                }
            }
            Ok(())
        }
    }
}

async fn connect(cfg: &Config) -> Result<Backend> {
    let needs_client =
        cfg.store.backend == StoreBackend::Supabase || cfg.listings.origin == ListingOrigin::Table;
    let client = if needs_client {
        Some(SupabaseClient::from_config(cfg)?)
    } else {
        None
    };

    let listings: Arc<dyn ListingSource> = match (cfg.listings.origin, &client) {
        (ListingOrigin::Table, Some(client)) => Arc::new(client.clone()),
        _ => {
            let path = cfg
                .listings
                .csv_path
                .clone()
                .ok_or_else(|| anyhow!("listings.csv_path is not set"))?;
            Arc::new(CsvListingSource::new(path))
        }
    };

    let store: Arc<dyn ReviewStore> = match (cfg.store.backend, &client) {
        (StoreBackend::Supabase, Some(client)) => Arc::new(client.clone()),
        _ => {
            let url = cfg.database_url();
            info!(%url, "using local review store");
            Arc::new(SqliteStore::connect(&url).await?)
        }
    };

    let session = SessionHandle::signed_out();
    let auth = match (cfg.store.backend, client) {
        (StoreBackend::Supabase, Some(client)) => Some(SupabaseAuth::new(client, session.clone())),
        _ => None,
    };

    Ok(Backend {
        listings,
        store,
        session,
        auth,
    })
}

/// Establish the session for this invocation. Auth failures end the command.
async fn sign_in(backend: &Backend, identity: &Identity) -> Result<bool> {
    if let Some(user) = identity.user {
        if backend.auth.is_some() {
            bail!("--user is only available with store.backend: sqlite; use --email and --password");
        }
        backend.session.set_user(Some(user));
        return Ok(true);
    }
    let (Some(email), Some(password)) = (&identity.email, &identity.password) else {
        return Ok(false);
    };
    let auth = backend
        .auth
        .as_ref()
        .ok_or_else(|| anyhow!("--email needs store.backend: supabase; use --user with sqlite"))?;
    auth.sign_in_with_password(email, password)
        .await
        .context("sign in failed")?;
    Ok(true)
}

async fn sign_out(backend: &Backend) {
    if let Some(auth) = &backend.auth {
        if let Err(err) = auth.sign_out().await {
            warn!(?err, "sign out failed");
        }
    }
}

async fn controller(cfg: &Config, backend: &Backend) -> SyncController {
    let controller = SyncController::with_quiet_period(
        backend.store.clone(),
        Arc::new(backend.session.clone()),
        cfg.app.comment_quiet_period(),
    );
    if let Err(err) = controller.load().await {
        warn!(?err, "failed to load reviews; continuing without them");
    }
    controller
}

async fn list(
    cfg: &Config,
    backend: &Backend,
    identity: &Identity,
    sort: SortOption,
    bedrooms: Option<u32>,
    view: ViewMode,
    nights: u32,
) -> Result<()> {
    let listings = backend
        .listings
        .load()
        .await
        .context("Failed to load listings")?;

    let signed_in = sign_in(backend, identity).await?;
    let controller = controller(cfg, backend).await;

    let items = controller.listings_with_stats(&listings);
    let options = browse::bedroom_options(&items);
    let items = browse::filter_by_bedrooms(items, bedrooms);
    let drafts = controller.drafts();
    let items = browse::sort_listings(items, sort, &drafts);

    let reviews = controller.reviews();
    let by_listing = stats::reviews_by_listing(&reviews);
    let ctx = RenderContext {
        reviews: &by_listing,
        drafts: signed_in.then_some(&drafts),
        nights,
    };

    let options = options
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" | ");
    println!(
        "{} of {} listings · sort: {} · bedrooms: any | {}",
        items.len(),
        listings.len(),
        sort.label(),
        options
    );
    println!();
    println!("{}", render::render_listings(&items, view, &ctx));

    if signed_in {
        sign_out(backend).await;
    }
    Ok(())
}
