//! Writes for the `newsctl put`, `import` and `delete` commands.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::digest::parse_digest;
use crate::error::ErrorKind;
use crate::get::print_record;
use crate::models::NewsItem;
use crate::news::NewsStore;

/// CLI entry point: upsert one item and print the stored record.
pub async fn run_put(store: &NewsStore, item: NewsItem) -> Result<()> {
    let record = store.put(&item).await?;
    print_record(&record);
    Ok(())
}

/// Parse an import file: a JSON array of items, or one JSON item per line.
///
/// Items without a domain get the URL's host.
pub fn parse_items(content: &str) -> Result<Vec<NewsItem>> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        let items: Vec<NewsItem> =
            serde_json::from_str(trimmed).context("Failed to parse JSON array of news items")?;
        return Ok(items.into_iter().map(NewsItem::with_domain_from_url).collect());
    }

    let mut items = Vec::new();
    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let item: NewsItem = serde_json::from_str(line)
            .with_context(|| format!("Failed to parse news item on line {}", n + 1))?;
        items.push(item.with_domain_from_url());
    }
    Ok(items)
}

/// CLI entry point: import items from a JSON or JSON-lines file, or from
/// a markdown digest when `digest` is set.
///
/// With `skip_existing`, URLs that are already stored are left untouched.
pub async fn run_import(
    store: &NewsStore,
    path: &Path,
    digest: bool,
    skip_existing: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let items = if digest {
        parse_digest(&content)
            .into_iter()
            .map(NewsItem::with_domain_from_url)
            .collect()
    } else {
        parse_items(&content)?
    };
    info!(count = items.len(), path = %path.display(), "importing news items");

    if skip_existing {
        let mut added = 0usize;
        let mut skipped = 0usize;
        let mut rejected = 0usize;
        for (index, item) in items.iter().enumerate() {
            match store.insert_new(item).await {
                Ok(Some(_)) => added += 1,
                Ok(None) => skipped += 1,
                Err(e) if e.kind() == ErrorKind::InvalidInput => {
                    eprintln!("  item {}: {}", index, e);
                    rejected += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
        println!("added: {}", added);
        println!("skipped: {}", skipped);
        println!("rejected: {}", rejected);
        return Ok(());
    }

    let report = store.put_many(&items).await?;
    println!("created: {}", report.created);
    println!("updated: {}", report.updated);
    println!("rejected: {}", report.rejected.len());
    for rejected in &report.rejected {
        eprintln!("  item {}: {}", rejected.index, rejected.error);
    }
    Ok(())
}

/// CLI entry point: delete the record for `url`.
pub async fn run_delete(store: &NewsStore, url: &str) -> Result<()> {
    if store.delete(url).await? {
        println!("deleted: {}", url);
    } else {
        println!("not found: {}", url);
    }
    Ok(())
}
