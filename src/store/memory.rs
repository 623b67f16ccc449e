//! In-memory [`DocumentStore`] for tests.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. The store can
//! be switched off with [`InMemoryStore::set_available`] to simulate an
//! unreachable database, and it counts every write that reaches it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{DocumentStore, Fields, Query};
use crate::error::{Result, StoreError};

type Collections = HashMap<String, HashMap<String, Fields>>;

/// In-memory store with fault injection.
pub struct InMemoryStore {
    collections: RwLock<Collections>,
    available: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
            writes: AtomicUsize::new(0),
        }
    }

    /// When `false`, every operation fails with `StoreUnavailable`.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of write calls (upsert, batch, delete) that reached the store.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of documents currently held in `collection`.
    pub fn len(&self, collection: &str) -> usize {
        self.collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(collection)
            .map_or(0, HashMap::len)
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::StoreUnavailable(
                "in-memory store is switched off".into(),
            ))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, collection: &str, key: &str, fields: &Fields) -> Result<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(key.to_string(), fields.clone());
        Ok(())
    }

    async fn upsert_batch(&self, collection: &str, entries: &[(String, Fields)]) -> Result<()> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let docs = collections.entry(collection.to_string()).or_default();
        for (key, fields) in entries {
            docs.insert(key.clone(), fields.clone());
        }
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Fields>> {
        self.check_available()?;
        let collections = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(collections.get(collection).and_then(|c| c.get(key)).cloned())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        self.check_available()?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(collections
            .get_mut(collection)
            .is_some_and(|c| c.remove(key).is_some()))
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Fields)>> {
        self.check_available()?;
        let docs: Vec<(String, Fields)> = {
            let collections = self
                .collections
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            collections
                .get(collection)
                .map(|c| c.iter().map(|(k, f)| (k.clone(), f.clone())).collect())
                .unwrap_or_default()
        };
        Ok(query.apply(docs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn fields(title: &str) -> Fields {
        let mut f = Fields::new();
        f.insert("title".into(), title.into());
        f
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let store = InMemoryStore::new();
        store.upsert("news", "k1", &fields("first")).await.unwrap();
        store.upsert("news", "k1", &fields("second")).await.unwrap();
        assert_eq!(store.len("news"), 1);
        let got = store.get("news", "k1").await.unwrap().unwrap();
        assert_eq!(got["title"].as_str(), Some("second"));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let store = InMemoryStore::new();
        store.upsert("news", "k1", &fields("a")).await.unwrap();
        assert!(store.get("other", "k1").await.unwrap().is_none());
        assert!(store.is_empty("other"));
    }

    #[tokio::test]
    async fn test_delete_reports_existence() {
        let store = InMemoryStore::new();
        store.upsert("news", "k1", &fields("a")).await.unwrap();
        assert!(store.delete("news", "k1").await.unwrap());
        assert!(!store.delete("news", "k1").await.unwrap());
        assert!(!store.delete("missing", "k1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = InMemoryStore::new();
        store.set_available(false);
        let err = store.get("news", "k1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        let err = store.upsert("news", "k1", &fields("a")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StoreUnavailable);
        assert_eq!(store.write_count(), 0);

        store.set_available(true);
        store.upsert("news", "k1", &fields("a")).await.unwrap();
        assert_eq!(store.write_count(), 1);
    }
}
