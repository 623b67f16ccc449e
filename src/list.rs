//! Listings for the `newsctl list` and `newsctl digest` commands.

use anyhow::{Context, Result};
use std::path::Path;

use crate::digest::render_digest;
use crate::models::StoredRecord;
use crate::news::NewsStore;

/// Which records `newsctl list` shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListFilter {
    All,
    Date(String),
    Domain(String),
}

/// CLI entry point: print matching records as markdown bullets or JSON.
///
/// Without a filter and with a `limit`, the newest records are shown.
pub async fn run_list(
    store: &NewsStore,
    filter: ListFilter,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let mut records: Vec<StoredRecord> = match (&filter, limit) {
        (ListFilter::All, Some(limit)) => store.recent(limit).await?,
        (ListFilter::All, None) => store.list_all().await?,
        (ListFilter::Date(date), _) => store.by_date(date).await?,
        (ListFilter::Domain(domain), _) => store.by_domain(domain).await?,
    };
    if let Some(limit) = limit {
        records.truncate(limit);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else if records.is_empty() {
        println!("No news items.");
    } else {
        for record in &records {
            println!("{}", record);
        }
    }
    Ok(())
}

/// CLI entry point: render every stored record as a markdown digest.
pub async fn run_digest(store: &NewsStore, heading: &str, output: Option<&Path>) -> Result<()> {
    let records = store.list_all().await?;
    let markdown = render_digest(heading, &records);

    match output {
        Some(path) => {
            std::fs::write(path, &markdown)
                .with_context(|| format!("Failed to write digest: {}", path.display()))?;
            println!("wrote {} items to {}", records.len(), path.display());
        }
        None => print!("{}", markdown),
    }
    Ok(())
}
