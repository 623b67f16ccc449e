//! The keyed upsert store for news items.
//!
//! [`NewsStore`] maps each [`NewsItem`] to one document addressed by
//! `news_` + SHA-256(url) (see [`crate::key`]) in a single collection of a
//! [`DocumentStore`]. It holds no state besides the backend handle and the
//! collection name.
//!
//! # Overwrites
//!
//! Writing a URL that is already stored replaces every field except
//! `created_at`, which keeps its first-write value; `updated_at` always
//! records the latest write. Concurrent writes of the same URL are
//! last-writer-wins at the backend, so under such races the preserved
//! `created_at` is best-effort.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info, warn};

use crate::config::{self, Config};
use crate::error::{Result, StoreError};
use crate::key;
use crate::models::{self, NewsItem, StoredRecord, FIELD_CREATED_AT, FIELD_DATE, FIELD_DOMAIN};
use crate::store::{self, DocumentStore, Query};

/// Current time at the precision every backend keeps (Firestore stores
/// microseconds), so returned records equal what a later read yields.
fn write_time() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// An item [`NewsStore::put_many`] refused to write.
#[derive(Debug)]
pub struct RejectedItem {
    /// Position in the input slice.
    pub index: usize,
    pub url: String,
    pub error: StoreError,
}

/// Outcome of [`NewsStore::put_many`].
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Records written for URLs that were not stored before.
    pub created: usize,
    /// Records written over an existing record.
    pub updated: usize,
    pub rejected: Vec<RejectedItem>,
}

impl BatchReport {
    pub fn written(&self) -> usize {
        self.created + self.updated
    }
}

/// Idempotent news store over a document backend.
#[derive(Clone)]
pub struct NewsStore {
    backend: Arc<dyn DocumentStore>,
    collection: String,
}

impl NewsStore {
    /// Wrap an already opened backend.
    ///
    /// # Errors
    ///
    /// [`StoreError::Configuration`] if `collection` is empty or contains `/`.
    pub fn new(backend: Arc<dyn DocumentStore>, collection: impl Into<String>) -> Result<Self> {
        let collection = collection.into();
        config::validate_collection(&collection)?;
        Ok(Self {
            backend,
            collection,
        })
    }

    /// Open the backend described by `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let backend = store::open(config).await?;
        Self::new(backend, config.store.collection.clone())
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn backend_name(&self) -> &str {
        self.backend.backend_name()
    }

    /// Derive the document key for `url` without touching the backend.
    pub fn document_key(url: &str) -> Result<String> {
        key::document_key(url)
    }

    async fn existing_created_at(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let existing = self.backend.get(&self.collection, key).await?;
        Ok(existing.map(|fields| {
            models::created_at_of(&fields).unwrap_or_else(|| {
                warn!(key, "stored record has no created_at; resetting it");
                write_time()
            })
        }))
    }

    /// Create or overwrite the record for `item.url`.
    ///
    /// # Errors
    ///
    /// [`StoreError::InvalidInput`] for an empty URL, before any backend
    /// call. Backend failures are returned as classified by the backend.
    pub async fn put(&self, item: &NewsItem) -> Result<StoredRecord> {
        let key = key::document_key(&item.url)?;
        let now = write_time();
        let created_at = self.existing_created_at(&key).await?.unwrap_or(now);

        let record = StoredRecord::from_item(key, item, created_at, now);
        self.backend
            .upsert(&self.collection, &record.document_key, &record.to_fields())
            .await?;

        debug!(
            key = %record.document_key,
            collection = %self.collection,
            created = created_at == now,
            "stored news item"
        );
        Ok(record)
    }

    /// Create the record for `item.url` only if none exists.
    ///
    /// Returns `None`, without writing, when the URL is already stored.
    pub async fn insert_new(&self, item: &NewsItem) -> Result<Option<StoredRecord>> {
        let key = key::document_key(&item.url)?;
        if self.backend.get(&self.collection, &key).await?.is_some() {
            debug!(key = %key, "news item already stored, skipping");
            return Ok(None);
        }

        let now = write_time();
        let record = StoredRecord::from_item(key, item, now, now);
        self.backend
            .upsert(&self.collection, &record.document_key, &record.to_fields())
            .await?;
        debug!(key = %record.document_key, "inserted news item");
        Ok(Some(record))
    }

    /// Upsert many items with a single batch write.
    ///
    /// Items with an invalid URL are reported in
    /// [`BatchReport::rejected`] and skipped. When the same URL appears
    /// more than once the last occurrence wins.
    pub async fn put_many(&self, items: &[NewsItem]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        let mut pending: Vec<(String, &NewsItem)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for (index, item) in items.iter().enumerate() {
            match key::document_key(&item.url) {
                Ok(key) => match positions.get(&key) {
                    Some(&pos) => pending[pos].1 = item,
                    None => {
                        positions.insert(key.clone(), pending.len());
                        pending.push((key, item));
                    }
                },
                Err(error) => {
                    warn!(index, url = %item.url, %error, "rejecting news item");
                    report.rejected.push(RejectedItem {
                        index,
                        url: item.url.clone(),
                        error,
                    });
                }
            }
        }

        if pending.is_empty() {
            return Ok(report);
        }

        let now = write_time();
        let mut entries = Vec::with_capacity(pending.len());
        for (key, item) in pending {
            let created_at = match self.existing_created_at(&key).await? {
                Some(ts) => {
                    report.updated += 1;
                    ts
                }
                None => {
                    report.created += 1;
                    now
                }
            };
            let record = StoredRecord::from_item(key, item, created_at, now);
            let fields = record.to_fields();
            entries.push((record.document_key, fields));
        }

        self.backend.upsert_batch(&self.collection, &entries).await?;
        info!(
            collection = %self.collection,
            created = report.created,
            updated = report.updated,
            rejected = report.rejected.len(),
            "batch upsert complete"
        );
        Ok(report)
    }

    /// Read the record stored for `url`, if any.
    pub async fn get(&self, url: &str) -> Result<Option<StoredRecord>> {
        let key = key::document_key(url)?;
        match self.backend.get(&self.collection, &key).await? {
            Some(fields) => Ok(Some(StoredRecord::from_fields(&key, &fields)?)),
            None => Ok(None),
        }
    }

    /// Delete the record for `url`. Returns `true` if one existed.
    pub async fn delete(&self, url: &str) -> Result<bool> {
        let key = key::document_key(url)?;
        let existed = self.backend.delete(&self.collection, &key).await?;
        debug!(key = %key, existed, "deleted news item");
        Ok(existed)
    }

    /// Run `query`, skipping documents that do not decode as records.
    ///
    /// Collections shared with older writers can hold documents without a
    /// `url`; one such document must not hide the rest of the listing.
    async fn run(&self, query: &Query) -> Result<Vec<StoredRecord>> {
        let docs = self.backend.query(&self.collection, query).await?;
        let mut records = Vec::with_capacity(docs.len());
        for (key, fields) in &docs {
            match StoredRecord::from_fields(key, fields) {
                Ok(record) => records.push(record),
                Err(error) => {
                    warn!(key = %key, %error, "skipping undecodable news record");
                }
            }
        }
        Ok(records)
    }

    /// Every record in the collection, ordered by document key.
    pub async fn list_all(&self) -> Result<Vec<StoredRecord>> {
        self.run(&Query::all()).await
    }

    /// The `limit` most recently created records, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<StoredRecord>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.run(&Query::all().newest_first(FIELD_CREATED_AT).limit(limit))
            .await
    }

    /// Records whose `date` equals `date` exactly.
    pub async fn by_date(&self, date: &str) -> Result<Vec<StoredRecord>> {
        self.run(&Query::where_eq(FIELD_DATE, date)).await
    }

    /// Records whose `domain` equals `domain` exactly.
    pub async fn by_domain(&self, domain: &str) -> Result<Vec<StoredRecord>> {
        self.run(&Query::where_eq(FIELD_DOMAIN, domain)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::store::memory::InMemoryStore;

    fn store() -> (Arc<InMemoryStore>, NewsStore) {
        let backend = Arc::new(InMemoryStore::new());
        let news = NewsStore::new(backend.clone(), "news").unwrap();
        (backend, news)
    }

    #[test]
    fn test_bad_collection_rejected() {
        let backend = Arc::new(InMemoryStore::new());
        let err = NewsStore::new(backend.clone(), "a/b").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        let err = NewsStore::new(backend, "news?page=2").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (_backend, news) = store();
        let item = NewsItem::new("A", "https://ex.com/a?x=1#y")
            .with_date("2024-01-01")
            .with_domain("ex.com");
        let written = news.put(&item).await.unwrap();
        assert_eq!(
            written.document_key,
            format!("news_{}", key::sha256_hex(b"https://ex.com/a?x=1#y"))
        );

        let read = news.get(&item.url).await.unwrap().unwrap();
        assert_eq!(read, written);
    }

    #[tokio::test]
    async fn test_empty_url_never_reaches_backend() {
        let (backend, news) = store();
        let err = news.put(&NewsItem::new("A", "")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(backend.write_count(), 0);
        assert!(backend.is_empty("news"));
    }

    #[tokio::test]
    async fn test_overwrite_preserves_created_at() {
        let (backend, news) = store();
        let first = news
            .put(&NewsItem::new("Old title", "https://ex.com/a"))
            .await
            .unwrap();
        let second = news
            .put(&NewsItem::new("New title", "https://ex.com/a"))
            .await
            .unwrap();

        assert_eq!(backend.len("news"), 1);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        let read = news.get("https://ex.com/a").await.unwrap().unwrap();
        assert_eq!(read.title, "New title");
    }

    #[tokio::test]
    async fn test_unavailable_backend() {
        let (backend, news) = store();
        backend.set_available(false);
        let err = news
            .put(&NewsItem::new("A", "https://ex.com/a"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        let err = news.get("https://ex.com/a").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    }

    #[tokio::test]
    async fn test_put_many_dedups_and_rejects() {
        let (backend, news) = store();
        news.put(&NewsItem::new("existing", "https://ex.com/1"))
            .await
            .unwrap();
        let writes_before = backend.write_count();

        let items = vec![
            NewsItem::new("one", "https://ex.com/1"),
            NewsItem::new("two", "https://ex.com/2"),
            NewsItem::new("bad", ""),
            NewsItem::new("two again", "https://ex.com/2"),
        ];
        let report = news.put_many(&items).await.unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.written(), 2);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].index, 2);
        assert_eq!(report.rejected[0].error.kind(), ErrorKind::InvalidInput);

        // One batch write for the whole call.
        assert_eq!(backend.write_count(), writes_before + 1);
        let two = news.get("https://ex.com/2").await.unwrap().unwrap();
        assert_eq!(two.title, "two again");
    }

    #[tokio::test]
    async fn test_put_many_all_invalid_writes_nothing() {
        let (backend, news) = store();
        let report = news.put_many(&[NewsItem::new("x", " ")]).await.unwrap();
        assert_eq!(report.written(), 0);
        assert_eq!(backend.write_count(), 0);
    }

    #[tokio::test]
    async fn test_insert_new_skips_existing() {
        let (backend, news) = store();
        let item = NewsItem::new("A", "https://ex.com/a");
        assert!(news.insert_new(&item).await.unwrap().is_some());
        let writes = backend.write_count();

        let again = NewsItem::new("A changed", "https://ex.com/a");
        assert!(news.insert_new(&again).await.unwrap().is_none());
        assert_eq!(backend.write_count(), writes);
        assert_eq!(news.get(&item.url).await.unwrap().unwrap().title, "A");
    }

    #[tokio::test]
    async fn test_delete() {
        let (_backend, news) = store();
        news.put(&NewsItem::new("A", "https://ex.com/a")).await.unwrap();
        assert!(news.delete("https://ex.com/a").await.unwrap());
        assert!(!news.delete("https://ex.com/a").await.unwrap());
        assert!(news.get("https://ex.com/a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_listing_skips_records_without_url() {
        let (backend, news) = store();
        news.put(
            &NewsItem::new("good", "https://ex.com/good")
                .with_date("01 Jan 2024")
                .with_domain("ex.com"),
        )
        .await
        .unwrap();

        // Written by an older tool that keyed URL-less items by title.
        let mut legacy = crate::store::Fields::new();
        legacy.insert(models::FIELD_TITLE.into(), "no link".into());
        legacy.insert(models::FIELD_URL.into(), "".into());
        legacy.insert(FIELD_DATE.into(), "01 Jan 2024".into());
        legacy.insert(FIELD_DOMAIN.into(), crate::store::FieldValue::Null);
        legacy.insert(FIELD_CREATED_AT.into(), write_time().into());
        backend
            .upsert("news", "0123456789abcdef0123", &legacy)
            .await
            .unwrap();

        let all = news.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].title, "good");
        assert_eq!(news.by_date("01 Jan 2024").await.unwrap().len(), 1);
        assert_eq!(news.recent(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_listing_queries() {
        let (_backend, news) = store();
        news.put(
            &NewsItem::new("a", "https://one.com/a")
                .with_date("01 Jan 2024")
                .with_domain("one.com"),
        )
        .await
        .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        news.put(
            &NewsItem::new("b", "https://two.com/b")
                .with_date("02 Jan 2024")
                .with_domain("two.com"),
        )
        .await
        .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        news.put(
            &NewsItem::new("c", "https://one.com/c")
                .with_date("02 Jan 2024")
                .with_domain("one.com"),
        )
        .await
        .unwrap();

        assert_eq!(news.list_all().await.unwrap().len(), 3);
        assert_eq!(news.by_date("02 Jan 2024").await.unwrap().len(), 2);

        let one: Vec<String> = news
            .by_domain("one.com")
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(one.len(), 2);
        assert!(one.contains(&"a".to_string()) && one.contains(&"c".to_string()));

        let recent = news.recent(1).await.unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].title, "c");
        assert!(news.recent(0).await.unwrap().is_empty());
    }
}
