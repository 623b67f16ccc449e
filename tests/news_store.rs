use std::sync::Arc;

use news_store::key::{document_key, sha256_hex};
use news_store::store::memory::InMemoryStore;
use news_store::store::sqlite::SqliteStore;
use news_store::store::DocumentStore;
use news_store::{ErrorKind, NewsItem, NewsStore};
use tempfile::TempDir;

const URL: &str = "https://ex.com/a?x=1#y";

async fn sqlite_store(tmp: &TempDir) -> NewsStore {
    let backend = SqliteStore::open(&tmp.path().join("news.sqlite"))
        .await
        .unwrap();
    NewsStore::new(Arc::new(backend), "news").unwrap()
}

fn sample() -> NewsItem {
    NewsItem::new("A", URL)
        .with_date("2024-01-01")
        .with_domain("ex.com")
}

#[test]
fn test_key_is_prefixed_sha256() {
    let key = document_key(URL).unwrap();
    assert_eq!(key, format!("news_{}", sha256_hex(URL.as_bytes())));
    assert_eq!(key, NewsStore::document_key(URL).unwrap());
    assert_eq!(key.len(), 5 + 64);
}

#[test]
fn test_distinct_urls_distinct_keys() {
    let a = document_key("https://ex.com/a").unwrap();
    let b = document_key("https://ex.com/a/").unwrap();
    let c = document_key("http://ex.com/a").unwrap();
    assert_ne!(a, b);
    assert_ne!(a, c);
    assert_ne!(b, c);
}

#[tokio::test]
async fn test_sqlite_put_is_idempotent() {
    let tmp = TempDir::new().unwrap();
    let news = sqlite_store(&tmp).await;

    let first = news.put(&sample()).await.unwrap();
    let second = news.put(&sample()).await.unwrap();
    assert_eq!(first.document_key, second.document_key);
    assert_eq!(first.created_at, second.created_at);

    let all = news.list_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].title, "A");
    assert_eq!(all[0].url, URL);
    assert_eq!(all[0].date, "2024-01-01");
    assert_eq!(all[0].domain, "ex.com");
}

#[tokio::test]
async fn test_sqlite_overwrite_replaces_fields() {
    let tmp = TempDir::new().unwrap();
    let news = sqlite_store(&tmp).await;

    let first = news.put(&sample()).await.unwrap();
    let changed = NewsItem::new("A, revised", URL).with_date("2024-01-02");
    news.put(&changed).await.unwrap();

    let read = news.get(URL).await.unwrap().unwrap();
    assert_eq!(read.title, "A, revised");
    assert_eq!(read.date, "2024-01-02");
    // Fields are replaced wholesale, so the old domain is gone.
    assert_eq!(read.domain, "");
    assert_eq!(read.created_at, first.created_at);
    assert_eq!(news.list_all().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_sqlite_survives_reopen() {
    let tmp = TempDir::new().unwrap();
    {
        let news = sqlite_store(&tmp).await;
        news.put(&sample()).await.unwrap();
    }
    let news = sqlite_store(&tmp).await;
    let read = news.get(URL).await.unwrap().unwrap();
    assert_eq!(read.title, "A");
}

#[tokio::test]
async fn test_sqlite_batch_and_filters() {
    let tmp = TempDir::new().unwrap();
    let news = sqlite_store(&tmp).await;

    let items: Vec<NewsItem> = (0..25)
        .map(|i| {
            NewsItem::new(format!("item {}", i), format!("https://site{}.com/{}", i % 3, i))
                .with_date(if i % 2 == 0 { "even" } else { "odd" })
                .with_domain_from_url()
        })
        .collect();
    let report = news.put_many(&items).await.unwrap();
    assert_eq!(report.created, 25);
    assert!(report.rejected.is_empty());

    assert_eq!(news.list_all().await.unwrap().len(), 25);
    assert_eq!(news.by_date("even").await.unwrap().len(), 13);
    assert_eq!(news.by_domain("site0.com").await.unwrap().len(), 9);
    assert_eq!(news.recent(4).await.unwrap().len(), 4);

    let report = news.put_many(&items).await.unwrap();
    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 25);
    assert_eq!(news.list_all().await.unwrap().len(), 25);
}

#[tokio::test]
async fn test_invalid_url_writes_nothing() {
    let backend = Arc::new(InMemoryStore::new());
    let news = NewsStore::new(backend.clone(), "news").unwrap();

    for url in ["", "   ", "\t\n"] {
        let err = news.put(&NewsItem::new("A", url)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(!err.kind().is_retryable());
    }
    assert_eq!(backend.write_count(), 0);
    assert!(backend.is_empty("news"));
}

#[tokio::test]
async fn test_unavailable_store_is_retryable() {
    let backend = Arc::new(InMemoryStore::new());
    let news = NewsStore::new(backend.clone(), "news").unwrap();
    backend.set_available(false);

    let err = news.put(&sample()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
    assert!(err.kind().is_retryable());

    backend.set_available(true);
    news.put(&sample()).await.unwrap();
    assert_eq!(backend.len("news"), 1);
}

#[tokio::test]
async fn test_collections_are_isolated() {
    let backend: Arc<InMemoryStore> = Arc::new(InMemoryStore::new());
    let news = NewsStore::new(backend.clone(), "news").unwrap();
    let archive = NewsStore::new(backend.clone(), "archive").unwrap();

    news.put(&sample()).await.unwrap();
    assert!(archive.get(URL).await.unwrap().is_none());
    assert_eq!(backend.backend_name(), "memory");
}

#[tokio::test]
async fn test_concurrent_puts_leave_one_record() {
    let tmp = TempDir::new().unwrap();
    let news = sqlite_store(&tmp).await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let news = news.clone();
        handles.push(tokio::spawn(async move {
            news.put(&NewsItem::new(format!("writer {}", i), URL))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let all = news.list_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(all[0].title.starts_with("writer "));
}
