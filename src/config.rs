//! Configuration loader and validator for the rental review client.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub listings: Listings,
    pub store: Store,
    pub supabase: Supabase,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    #[serde(default = "default_comment_debounce_ms")]
    pub comment_debounce_ms: u64,
    #[serde(default = "default_nights")]
    pub default_nights: u32,
}

fn default_comment_debounce_ms() -> u64 {
    600
}

fn default_nights() -> u32 {
    7
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListingOrigin {
    Csv,
    Table,
}

/// Where listings come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Listings {
    pub origin: ListingOrigin,
    #[serde(default)]
    pub csv_path: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Supabase,
    Sqlite,
}

/// Where reviews are stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Store {
    pub backend: StoreBackend,
    #[serde(default)]
    pub database_url: Option<String>,
}

/// Hosted project settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Supabase {
    pub url: String,
    pub anon_key: String,
}

impl App {
    pub fn comment_quiet_period(&self) -> Duration {
        Duration::from_millis(self.comment_debounce_ms)
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    /// SQLite URL for the local review store; defaults to a file in `data_dir`.
    pub fn database_url(&self) -> String {
        self.store
            .database_url
            .clone()
            .unwrap_or_else(|| format!("sqlite://{}/reviews.db", self.app.data_dir))
    }

    /// Apply `SUPABASE_URL`, `SUPABASE_ANON_KEY` (or `SUPABASE_PUBLISHABLE_KEY`)
    /// and `DATABASE_URL` from the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = present("SUPABASE_URL") {
            self.supabase.url = url;
        }
        if let Some(key) = present("SUPABASE_ANON_KEY").or_else(|| present("SUPABASE_PUBLISHABLE_KEY")) {
            self.supabase.anon_key = key;
        }
        if let Some(url) = present("DATABASE_URL") {
            self.store.database_url = Some(url);
        }
    }
}

/// Load configuration from a YAML file, apply environment overrides and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let mut cfg: Config = serde_yaml::from_str(&content)?;
    cfg.apply_env_overrides();
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.comment_debounce_ms == 0 {
        return Err(ConfigError::Invalid("app.comment_debounce_ms must be > 0"));
    }
    if !(1..=365).contains(&cfg.app.default_nights) {
        return Err(ConfigError::Invalid("app.default_nights must be within 1..=365"));
    }

    if cfg.listings.origin == ListingOrigin::Csv
        && cfg
            .listings
            .csv_path
            .as_deref()
            .map(|p| p.trim().is_empty())
            .unwrap_or(true)
    {
        return Err(ConfigError::Invalid(
            "listings.csv_path must be set when listings.origin is csv",
        ));
    }

    let needs_supabase =
        cfg.listings.origin == ListingOrigin::Table || cfg.store.backend == StoreBackend::Supabase;
    if needs_supabase {
        if cfg.supabase.url.trim().is_empty() {
            return Err(ConfigError::Invalid("supabase.url must be non-empty"));
        }
        if reqwest::Url::parse(&cfg.supabase.url).is_err() {
            return Err(ConfigError::Invalid("supabase.url must be an absolute URL"));
        }
        if cfg.supabase.anon_key.trim().is_empty() {
            return Err(ConfigError::Invalid("supabase.anon_key must be non-empty"));
        }
    }

    Ok(())
}

/// Returns the example YAML content.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  comment_debounce_ms: 600
  default_nights: 7

listings:
  origin: csv
  csv_path: "./holiday_rentals_2026_2027.csv"

store:
  backend: supabase
  # database_url: "sqlite://./data/reviews.db"

supabase:
  url: "https://YOUR_PROJECT.supabase.co/"
  anon_key: "YOUR_SUPABASE_ANON_KEY"
"#
}
