//! Record retrieval for the `newsctl get` and `newsctl key` commands.

use anyhow::{bail, Result};

use crate::models::StoredRecord;
use crate::news::NewsStore;

fn format_ts(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Print one record in the aligned `field: value` layout.
pub fn print_record(record: &StoredRecord) {
    println!("--- News Item ---");
    println!("document_key: {}", record.document_key);
    println!("title:        {}", record.title);
    println!("url:          {}", record.url);
    if !record.date.is_empty() {
        println!("date:         {}", record.date);
    }
    if !record.domain.is_empty() {
        println!("domain:       {}", record.domain);
    }
    println!("created_at:   {}", format_ts(&record.created_at));
    println!("updated_at:   {}", format_ts(&record.updated_at));
}

/// CLI entry point: fetch the record for `url` and print it.
pub async fn run_get(store: &NewsStore, url: &str, json: bool) -> Result<()> {
    let Some(record) = store.get(url).await? else {
        bail!("no news item stored for {}", url);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(())
}

/// CLI entry point: print the document key for `url`.
pub fn run_key(url: &str) -> Result<()> {
    println!("{}", NewsStore::document_key(url)?);
    Ok(())
}
