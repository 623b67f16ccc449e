//! Firestore-backed [`DocumentStore`] over the REST v1 API.
//!
//! | Operation | Request |
//! |-----------|---------|
//! | upsert | `PATCH …/documents/{collection}/{key}` (no update mask: full overwrite, creates if absent) |
//! | upsert_batch | `POST …/documents:commit`, at most 500 writes per commit |
//! | get | `GET …/documents/{collection}/{key}`, 404 → absent |
//! | delete | `DELETE …?currentDocument.exists=true`, 404 → did not exist |
//! | query | `POST …/documents:runQuery` with a `structuredQuery` |
//!
//! Field values use Firestore's typed JSON encoding (`stringValue`,
//! `timestampValue`, `nullValue`). HTTP failures are classified into
//! distinct [`StoreError`] variants so the caller can tell authentication,
//! permission, project, and database problems apart. Nothing here retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{DocumentStore, FieldValue, Fields, Query};
use crate::config::FirestoreConfig;
use crate::credentials::{self, CredentialProvider};
use crate::error::{Result, StoreError};

/// Firestore rejects commits with more writes than this.
pub const MAX_WRITES_PER_COMMIT: usize = 500;

/// Firestore REST client bound to one project and database.
pub struct FirestoreStore {
    client: reqwest::Client,
    /// `projects/{project}/databases/{database}`
    database_path: String,
    /// `{endpoint}/v1/{database_path}/documents`
    documents_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl FirestoreStore {
    /// Build a client from configuration, resolving credentials now.
    ///
    /// # Errors
    ///
    /// [`StoreError::Configuration`] when the project is missing or the
    /// credentials file cannot be used.
    pub fn new(config: &FirestoreConfig) -> Result<Self> {
        config.validate()?;
        let credentials =
            credentials::provider_for(&config.credential_source(), config.uses_emulator())?;
        Self::with_credentials(config, credentials)
    }

    /// Build a client with an explicit credential provider.
    pub fn with_credentials(
        config: &FirestoreConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let project = config.project_id.as_deref().unwrap_or_default().trim();
        let database_path = format!("projects/{}/databases/{}", project, config.database_id);
        let documents_url = format!("{}/v1/{}/documents", config.base_endpoint(), database_path);

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        debug!(
            database = %database_path,
            credentials = %credentials.describe(),
            "firestore client ready"
        );

        Ok(Self {
            client,
            database_path,
            documents_url,
            credentials,
        })
    }

    pub fn database_path(&self) -> &str {
        &self.database_path
    }

    fn document_url(&self, collection: &str, key: &str) -> String {
        format!("{}/{}/{}", self.documents_url, collection, key)
    }

    fn document_name(&self, collection: &str, key: &str) -> String {
        format!("{}/documents/{}/{}", self.database_path, collection, key)
    }

    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder> {
        let mut builder = self.client.request(method, url);
        if let Some(token) = self.credentials.access_token(&self.client).await? {
            builder = builder.bearer_auth(token);
        }
        Ok(builder)
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        builder
            .send()
            .await
            .map_err(|e| StoreError::StoreUnavailable(format!("firestore unreachable: {}", e)))
    }

    async fn json_body(&self, response: Response, context: &str) -> Result<Value> {
        response.json().await.map_err(|e| {
            StoreError::StoreUnavailable(format!("{}: unreadable response: {}", context, e))
        })
    }
}

// ============ Value codec ============

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Encode a field map as Firestore's `fields` object.
pub fn encode_fields(fields: &Fields) -> Value {
    let mut out = Map::new();
    for (name, value) in fields {
        let encoded = match value {
            FieldValue::Null => json!({ "nullValue": null }),
            FieldValue::String(s) => json!({ "stringValue": s }),
            FieldValue::Timestamp(ts) => json!({ "timestampValue": format_timestamp(ts) }),
        };
        out.insert(name.clone(), encoded);
    }
    Value::Object(out)
}

/// Decode Firestore's `fields` object.
///
/// Value types this store never writes (numbers, maps, arrays, ...) are
/// skipped with a warning rather than failing the whole document.
pub fn decode_fields(key: &str, fields: Option<&Value>) -> Result<Fields> {
    let mut out = Fields::new();
    let Some(fields) = fields else {
        return Ok(out);
    };
    let obj = fields
        .as_object()
        .ok_or_else(|| StoreError::malformed(key, "'fields' is not an object"))?;

    for (name, typed) in obj {
        let value = if typed.get("nullValue").is_some() {
            FieldValue::Null
        } else if let Some(s) = typed.get("stringValue").and_then(Value::as_str) {
            FieldValue::String(s.to_string())
        } else if let Some(ts) = typed.get("timestampValue").and_then(Value::as_str) {
            let parsed = DateTime::parse_from_rfc3339(ts).map_err(|e| {
                StoreError::malformed(key, format!("field '{}': bad timestamp '{}': {}", name, ts, e))
            })?;
            FieldValue::Timestamp(parsed.with_timezone(&Utc))
        } else {
            warn!(key, field = %name, "skipping field with unsupported Firestore type");
            continue;
        };
        out.insert(name.clone(), value);
    }
    Ok(out)
}

/// Last path segment of a Firestore document name.
pub fn key_from_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Build the `runQuery` request body.
pub fn structured_query(collection: &str, query: &Query) -> Value {
    let mut sq = Map::new();
    sq.insert("from".into(), json!([{ "collectionId": collection }]));
    if let Some(filter) = &query.filter {
        let mut single = Fields::new();
        single.insert(filter.field.clone(), filter.value.clone());
        let value = encode_fields(&single)
            .get(&filter.field)
            .cloned()
            .unwrap_or(Value::Null);
        sq.insert(
            "where".into(),
            json!({
                "fieldFilter": {
                    "field": { "fieldPath": filter.field },
                    "op": "EQUAL",
                    "value": value,
                }
            }),
        );
    }
    if let Some(field) = &query.order_by_desc {
        sq.insert(
            "orderBy".into(),
            json!([{ "field": { "fieldPath": field }, "direction": "DESCENDING" }]),
        );
    }
    if let Some(limit) = query.limit {
        sq.insert("limit".into(), json!(limit));
    }
    json!({ "structuredQuery": Value::Object(sq) })
}

// ============ Error classification ============

fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Distinguish a missing project or database from a missing document.
///
/// Returns `None` when a 404 only means the addressed document is absent.
pub fn classify_not_found(body: &str) -> Option<StoreError> {
    let message = error_message(body);
    let lower = message.to_lowercase();
    if lower.contains("database") && lower.contains("does not exist") {
        return Some(StoreError::DatabaseNotFound(message));
    }
    if lower.contains("project")
        && (lower.contains("not found") || lower.contains("does not exist"))
        && !lower.contains("document")
    {
        return Some(StoreError::ProjectNotFound(message));
    }
    None
}

/// Map a failed HTTP response to a [`StoreError`].
pub fn classify_status(status: StatusCode, body: &str, context: &str) -> StoreError {
    let message = format!("{}: {} {}", context, status.as_u16(), error_message(body));
    match status.as_u16() {
        400 => StoreError::RequestRejected(message),
        401 => StoreError::Authentication(message),
        403 => StoreError::PermissionDenied(message),
        404 => classify_not_found(body).unwrap_or(StoreError::DatabaseNotFound(message)),
        _ => StoreError::StoreUnavailable(message),
    }
}

async fn failure(response: Response, context: &str) -> StoreError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    classify_status(status, &body, context)
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    fn backend_name(&self) -> &str {
        "firestore"
    }

    async fn upsert(&self, collection: &str, key: &str, fields: &Fields) -> Result<()> {
        let url = self.document_url(collection, key);
        let builder = self
            .request(Method::PATCH, &url)
            .await?
            .json(&json!({ "fields": encode_fields(fields) }));
        let response = self.send(builder).await?;
        if !response.status().is_success() {
            return Err(failure(response, "upsert").await);
        }
        debug!(collection, key, "firestore upsert");
        Ok(())
    }

    async fn upsert_batch(&self, collection: &str, entries: &[(String, Fields)]) -> Result<()> {
        let url = format!("{}:commit", self.documents_url);
        for chunk in entries.chunks(MAX_WRITES_PER_COMMIT) {
            let writes: Vec<Value> = chunk
                .iter()
                .map(|(key, fields)| {
                    json!({
                        "update": {
                            "name": self.document_name(collection, key),
                            "fields": encode_fields(fields),
                        }
                    })
                })
                .collect();
            let builder = self
                .request(Method::POST, &url)
                .await?
                .json(&json!({ "writes": writes }));
            let response = self.send(builder).await?;
            if !response.status().is_success() {
                return Err(failure(response, "commit").await);
            }
            debug!(collection, writes = chunk.len(), "firestore commit");
        }
        Ok(())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Fields>> {
        let url = self.document_url(collection, key);
        let builder = self.request(Method::GET, &url).await?;
        let response = self.send(builder).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return match classify_not_found(&body) {
                Some(err) => Err(err),
                None => Ok(None),
            };
        }
        if !status.is_success() {
            return Err(failure(response, "get").await);
        }

        let doc = self.json_body(response, "get").await?;
        Ok(Some(decode_fields(key, doc.get("fields"))?))
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<bool> {
        let url = self.document_url(collection, key);
        let builder = self
            .request(Method::DELETE, &url)
            .await?
            .query(&[("currentDocument.exists", "true")]);
        let response = self.send(builder).await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return match classify_not_found(&body) {
                Some(err) => Err(err),
                None => Ok(false),
            };
        }
        if !status.is_success() {
            return Err(failure(response, "delete").await);
        }
        Ok(true)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<(String, Fields)>> {
        let url = format!("{}:runQuery", self.documents_url);
        let builder = self
            .request(Method::POST, &url)
            .await?
            .json(&structured_query(collection, query));
        let response = self.send(builder).await?;
        if !response.status().is_success() {
            return Err(failure(response, "query").await);
        }

        let body = self.json_body(response, "query").await?;
        let items = body
            .as_array()
            .ok_or_else(|| StoreError::StoreUnavailable("query: response is not an array".into()))?;

        let mut docs = Vec::new();
        for item in items {
            // Entries without a document only carry progress metadata.
            let Some(doc) = item.get("document") else {
                continue;
            };
            let name = doc.get("name").and_then(Value::as_str).unwrap_or_default();
            let key = key_from_name(name).to_string();
            let fields = decode_fields(&key, doc.get("fields"))?;
            docs.push((key, fields));
        }
        Ok(docs)
    }
}
