//! News data types.
//!
//! [`NewsItem`] is what upstream producers hand to the store;
//! [`StoredRecord`] is what comes back out, with its document key and
//! write timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, StoreError};
use crate::store::{FieldValue, Fields};

pub const FIELD_TITLE: &str = "title";
pub const FIELD_URL: &str = "url";
pub const FIELD_DATE: &str = "date";
pub const FIELD_DOMAIN: &str = "domain";
pub const FIELD_CREATED_AT: &str = "created_at";
pub const FIELD_UPDATED_AT: &str = "updated_at";

/// A news item as produced upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    /// Natural unique identifier of the item.
    pub url: String,
    /// Publication date, free-form.
    #[serde(default)]
    pub date: String,
    /// Source site.
    #[serde(default)]
    pub domain: String,
}

impl NewsItem {
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            date: String::new(),
            domain: String::new(),
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    /// Fill an empty `domain` with the URL's host, if the URL parses.
    pub fn with_domain_from_url(mut self) -> Self {
        if self.domain.is_empty() {
            self.domain = url::Url::parse(&self.url)
                .ok()
                .and_then(|u| u.host_str().map(str::to_string))
                .unwrap_or_default();
        }
        self
    }
}

/// A news item as persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub document_key: String,
    pub title: String,
    pub url: String,
    pub date: String,
    pub domain: String,
    /// Set on first write, kept on overwrite.
    pub created_at: DateTime<Utc>,
    /// Set on every write.
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    pub fn from_item(
        document_key: String,
        item: &NewsItem,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            document_key,
            title: item.title.clone(),
            url: item.url.clone(),
            date: item.date.clone(),
            domain: item.domain.clone(),
            created_at,
            updated_at,
        }
    }

    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(FIELD_TITLE.into(), self.title.as_str().into());
        fields.insert(FIELD_URL.into(), self.url.as_str().into());
        fields.insert(FIELD_DATE.into(), self.date.as_str().into());
        fields.insert(FIELD_DOMAIN.into(), self.domain.as_str().into());
        fields.insert(FIELD_CREATED_AT.into(), self.created_at.into());
        fields.insert(FIELD_UPDATED_AT.into(), self.updated_at.into());
        fields
    }

    /// Rebuild a record from stored fields.
    ///
    /// Null or missing `title`, `date` and `domain` read as empty strings.
    /// Records without `updated_at` (written before it existed) reuse
    /// `created_at`.
    pub fn from_fields(document_key: &str, fields: &Fields) -> Result<Self> {
        let text = |name: &str| -> Result<String> {
            match fields.get(name) {
                None | Some(FieldValue::Null) => Ok(String::new()),
                Some(FieldValue::String(s)) => Ok(s.clone()),
                Some(other) => Err(StoreError::malformed(
                    document_key,
                    format!("field '{}' is not a string: {:?}", name, other),
                )),
            }
        };

        let url = text(FIELD_URL)?;
        if url.is_empty() {
            return Err(StoreError::malformed(document_key, "missing field 'url'"));
        }
        let created_at = created_at_of(fields).ok_or_else(|| {
            StoreError::malformed(document_key, "missing timestamp 'created_at'")
        })?;
        let updated_at = fields
            .get(FIELD_UPDATED_AT)
            .and_then(FieldValue::as_timestamp)
            .unwrap_or(created_at);

        Ok(Self {
            document_key: document_key.to_string(),
            title: text(FIELD_TITLE)?,
            url,
            date: text(FIELD_DATE)?,
            domain: text(FIELD_DOMAIN)?,
            created_at,
            updated_at,
        })
    }
}

pub(crate) fn created_at_of(fields: &Fields) -> Option<DateTime<Utc>> {
    fields
        .get(FIELD_CREATED_AT)
        .and_then(FieldValue::as_timestamp)
}

impl fmt::Display for StoredRecord {
    /// Markdown bullet: `* title - [domain](url)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.url.is_empty() && !self.domain.is_empty() {
            write!(f, "* {} - [{}]({})", self.title, self.domain, self.url)
        } else {
            write!(f, "* {}", self.title)
        }
    }
}
