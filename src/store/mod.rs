//! Document database abstraction.
//!
//! The [`DocumentStore`] trait is the narrow read/write surface the news
//! store needs from a document database: point upserts and reads keyed by
//! caller-supplied IDs, deletes, and a small query shape. Backends:
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | Firestore | [`firestore`] | production, Firestore REST v1 |
//! | SQLite | [`sqlite`] | local durable store, offline use |
//! | In-memory | [`memory`] | tests, fault injection |
//!
//! Implementations must be `Send + Sync` so a single handle can be shared
//! across tasks.

pub mod firestore;
pub mod memory;
pub mod sqlite;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{Backend, Config};
use crate::error::Result;

/// A single field value inside a document.
///
/// Variant order doubles as the sort order across types: nulls sort
/// lowest, then strings, then timestamps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    String(String),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(ts) => Some(*ts),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(ts: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(ts)
    }
}

/// Field map of one document.
pub type Fields = BTreeMap<String, FieldValue>;

/// Equality filter on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub field: String,
    pub value: FieldValue,
}

/// Query over one collection.
///
/// Without an order field, results come back ordered by document key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filter: Option<FieldFilter>,
    pub order_by_desc: Option<String>,
    pub limit: Option<usize>,
}

impl Query {
    /// Every document in the collection.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn where_eq(field: &str, value: impl Into<FieldValue>) -> Self {
        Self {
            filter: Some(FieldFilter {
                field: field.to_string(),
                value: value.into(),
            }),
            ..Self::default()
        }
    }

    pub fn newest_first(mut self, field: &str) -> Self {
        self.order_by_desc = Some(field.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Evaluate the query against an unordered set of documents.
    ///
    /// Used by the backends that have no native query engine. Documents
    /// missing the order field sort after all others.
    pub fn apply(&self, docs: Vec<(String, Fields)>) -> Vec<(String, Fields)> {
        let mut matched: Vec<(String, Fields)> = docs
            .into_iter()
            .filter(|(_, fields)| match &self.filter {
                Some(f) => fields.get(&f.field) == Some(&f.value),
                None => true,
            })
            .collect();

        matched.sort_by(|a, b| a.0.cmp(&b.0));
        if let Some(field) = &self.order_by_desc {
            matched.sort_by(|a, b| b.1.get(field).cmp(&a.1.get(field)));
        }
        if let Some(limit) = self.limit {
            matched.truncate(limit);
        }
        matched
    }
}

/// Abstract document database.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert`](DocumentStore::upsert) | Create or fully overwrite a document |
/// | [`upsert_batch`](DocumentStore::upsert_batch) | Upsert many documents |
/// | [`get`](DocumentStore::get) | Point read by key |
/// | [`delete`](DocumentStore::delete) | Remove a document |
/// | [`query`](DocumentStore::query) | Filtered, ordered listing |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Short backend name for logs and CLI output.
    fn backend_name(&self) -> &str;

    /// Create the document if absent, otherwise replace all its fields.
    async fn upsert(&self, collection: &str, key: &str, fields: &Fields) -> Result<()>;

    /// Upsert several documents. Backends with a native batch write
    /// override this.
    async fn upsert_batch(&self, collection: &str, entries: &[(String, Fields)]) -> Result<()> {
        for (key, fields) in entries {
            self.upsert(collection, key, fields).await?;
        }
        Ok(())
    }

    /// Read a document, or `None` if no document has this key.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Fields>>;

    /// Delete a document. Returns `true` if it existed.
    async fn delete(&self, collection: &str, key: &str) -> Result<bool>;

    /// Run a query over one collection, returning `(key, fields)` pairs.
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Fields)>>;
}

/// Open the backend selected by `config.store.backend`.
///
/// # Errors
///
/// Returns [`StoreError::Configuration`](crate::error::StoreError::Configuration)
/// for invalid settings or unreadable credentials, and
/// [`StoreError::StoreUnavailable`](crate::error::StoreError::StoreUnavailable)
/// if the SQLite database cannot be opened.
pub async fn open(config: &Config) -> Result<Arc<dyn DocumentStore>> {
    config.validate()?;
    match config.store.backend {
        Backend::Firestore => Ok(Arc::new(firestore::FirestoreStore::new(&config.firestore)?)),
        Backend::Sqlite => Ok(Arc::new(sqlite::SqliteStore::open(&config.sqlite.path).await?)),
        Backend::Memory => Ok(Arc::new(memory::InMemoryStore::new())),
    }
}
