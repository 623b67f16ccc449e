//! # News Store CLI (`newsctl`)
//!
//! Command-line access to the news store.
//!
//! ## Usage
//!
//! ```bash
//! newsctl --config ./config/news.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `newsctl init` | Open the backend (creates the SQLite schema) |
//! | `newsctl key <url>` | Print the document key for a URL |
//! | `newsctl put` | Store one news item |
//! | `newsctl get <url>` | Show the record stored for a URL |
//! | `newsctl delete <url>` | Delete the record for a URL |
//! | `newsctl list` | List records, optionally by date or domain |
//! | `newsctl import <file>` | Store items from a JSON, JSON-lines or `--digest` markdown file |
//! | `newsctl digest` | Render all records as a markdown digest |
//!
//! Environment variables `GOOGLE_CLOUD_PROJECT`, `FIRESTORE_DATABASE_ID`,
//! `FIRESTORE_COLLECTION_NAME`, `GOOGLE_APPLICATION_CREDENTIALS` and
//! `FIRESTORE_EMULATOR_HOST` override the config file.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{fmt as tfmt, EnvFilter};

use news_store::config;
use news_store::list::ListFilter;
use news_store::{get, list, put, NewsItem, NewsStore};

/// News Store CLI: idempotent, URL-keyed storage of news items.
#[derive(Parser)]
#[command(
    name = "newsctl",
    about = "Store and read news items keyed by a hash of their URL",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/news.toml`. A missing file means built-in
    /// defaults plus environment overrides.
    #[arg(long, global = true, default_value = "./config/news.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open the configured backend, creating the SQLite schema if needed.
    Init,

    /// Print the document key derived from a URL.
    Key {
        url: String,
    },

    /// Store one news item, overwriting any record for the same URL.
    Put {
        #[arg(long)]
        title: String,
        #[arg(long)]
        url: String,
        /// Publication date (free-form).
        #[arg(long, default_value = "")]
        date: String,
        /// Source site. Derived from the URL when omitted.
        #[arg(long, default_value = "")]
        domain: String,
    },

    /// Show the record stored for a URL.
    Get {
        url: String,
        /// Print the record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Delete the record stored for a URL.
    Delete {
        url: String,
    },

    /// List stored records.
    List {
        /// Only records with this exact date.
        #[arg(long, conflicts_with = "domain")]
        date: Option<String>,
        /// Only records from this domain.
        #[arg(long)]
        domain: Option<String>,
        /// Maximum number of records; without a filter, the newest ones.
        #[arg(long)]
        limit: Option<usize>,
        /// Print records as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Store items from a JSON array or JSON-lines file.
    Import {
        file: PathBuf,
        /// Read the file as a markdown digest written by `digest`.
        #[arg(long)]
        digest: bool,
        /// Leave URLs that are already stored untouched.
        #[arg(long)]
        skip_existing: bool,
    },

    /// Render all records as a markdown digest grouped by date.
    Digest {
        #[arg(long, default_value = "AI news")]
        heading: String,
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't need a backend
    if let Commands::Key { url } = &cli.command {
        return get::run_key(url);
    }

    let mut cfg = config::load_config_or_default(&cli.config)?;
    cfg.apply_env_overrides(|name| std::env::var(name).ok());
    debug!(backend = ?cfg.store.backend, collection = %cfg.store.collection, "configuration loaded");

    let store = NewsStore::open(&cfg).await?;

    match cli.command {
        Commands::Init => {
            println!(
                "Store ready: backend={} collection={}",
                store.backend_name(),
                store.collection()
            );
        }
        Commands::Key { url } => get::run_key(&url)?,
        Commands::Put {
            title,
            url,
            date,
            domain,
        } => {
            let item = NewsItem::new(title, url)
                .with_date(date)
                .with_domain(domain)
                .with_domain_from_url();
            put::run_put(&store, item).await?;
        }
        Commands::Get { url, json } => {
            get::run_get(&store, &url, json).await?;
        }
        Commands::Delete { url } => {
            put::run_delete(&store, &url).await?;
        }
        Commands::List {
            date,
            domain,
            limit,
            json,
        } => {
            let filter = match (date, domain) {
                (Some(date), _) => ListFilter::Date(date),
                (None, Some(domain)) => ListFilter::Domain(domain),
                (None, None) => ListFilter::All,
            };
            list::run_list(&store, filter, limit, json).await?;
        }
        Commands::Import {
            file,
            digest,
            skip_existing,
        } => {
            put::run_import(&store, &file, digest, skip_existing).await?;
        }
        Commands::Digest { heading, output } => {
            list::run_digest(&store, &heading, output.as_deref()).await?;
        }
    }

    Ok(())
}
