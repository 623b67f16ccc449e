//! SQLite-backed [`DocumentStore`].
//!
//! Maps each collection/key pair to one row of the `documents` table and
//! keeps the field map as JSON. Upserts use `ON CONFLICT DO UPDATE` so a
//! second write to the same key replaces the fields in place.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use super::{DocumentStore, Fields, Query};
use crate::db;
use crate::error::{Result, StoreError};
use crate::migrate;

/// SQLite implementation of the [`DocumentStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap an existing pool. The schema must already exist.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the database at `path` and run migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn encode(key: &str, fields: &Fields) -> Result<String> {
    serde_json::to_string(fields).map_err(|e| StoreError::malformed(key, e.to_string()))
}

fn decode(key: &str, json: &str) -> Result<Fields> {
    serde_json::from_str(json).map_err(|e| StoreError::malformed(key, e.to_string()))
}

const UPSERT_SQL: &str = r#"
    INSERT INTO documents (collection, key, fields_json, written_at)
    VALUES (?, ?, ?, ?)
    ON CONFLICT(collection, key) DO UPDATE SET
        fields_json = excluded.fields_json,
        written_at = excluded.written_at
"#;

#[async_trait]
impl DocumentStore for SqliteStore {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn upsert(&self, collection: &str, key: &str, fields: &Fields) -> Result<()> {
        let json = encode(key, fields)?;
        sqlx::query(UPSERT_SQL)
            .bind(collection)
            .bind(key)
            .bind(&json)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_batch(&self, collection: &str, entries: &[(String, Fields)]) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for (key, fields) in entries {
            let json = encode(key, fields)?;
            sqlx::query(UPSERT_SQL)
                .bind(collection)
                .bind(key)
                .bind(&json)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Fields>> {
        let row = sqlx::query("SELECT fields_json FROM documents WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.get("fields_json");
                Ok(Some(decode(key, &json)?))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = ? AND key = ?")
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Fields)>> {
        let rows = sqlx::query("SELECT key, fields_json FROM documents WHERE collection = ?")
            .bind(collection)
            .fetch_all(&self.pool)
            .await?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in &rows {
            let key: String = row.get("key");
            let json: String = row.get("fields_json");
            let fields = decode(&key, &json)?;
            docs.push((key, fields));
        }
        Ok(query.apply(docs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FieldValue;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn fields(title: &str, ts: i64) -> Fields {
        let mut f = Fields::new();
        f.insert("title".into(), title.into());
        f.insert("date".into(), FieldValue::Null);
        f.insert("created_at".into(), Utc.timestamp_opt(ts, 0).unwrap().into());
        f
    }

    async fn open_temp() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("data/news.sqlite"))
            .await
            .unwrap();
        (tmp, store)
    }

    #[tokio::test]
    async fn test_upsert_get_roundtrip() {
        let (_tmp, store) = open_temp().await;
        let f = fields("hello", 1_700_000_000);
        store.upsert("news", "news_1", &f).await.unwrap();
        assert_eq!(store.get("news", "news_1").await.unwrap(), Some(f));
        assert_eq!(store.get("news", "news_2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_replaces_fields() {
        let (_tmp, store) = open_temp().await;
        store.upsert("news", "k", &fields("one", 1)).await.unwrap();
        store.upsert("news", "k", &fields("two", 2)).await.unwrap();
        let all = store.query("news", &Query::all()).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].1["title"].as_str(), Some("two"));
    }

    #[tokio::test]
    async fn test_batch_and_query() {
        let (_tmp, store) = open_temp().await;
        let entries = vec![
            ("a".to_string(), fields("a", 10)),
            ("b".to_string(), fields("b", 30)),
            ("c".to_string(), fields("c", 20)),
        ];
        store.upsert_batch("news", &entries).await.unwrap();
        let recent = store
            .query("news", &Query::all().newest_first("created_at").limit(2))
            .await
            .unwrap();
        let keys: Vec<&str> = recent.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let (_tmp, store) = open_temp().await;
        store.upsert("news", "k", &fields("x", 1)).await.unwrap();
        assert!(store.delete("news", "k").await.unwrap());
        assert!(!store.delete("news", "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let (_tmp, store) = open_temp().await;
        migrate::run_migrations(store.pool()).await.unwrap();
        migrate::run_migrations(store.pool()).await.unwrap();
    }
}
