//! Document key derivation.
//!
//! A news item is addressed by `news_` followed by the lowercase hex
//! SHA-256 digest of its URL. The digest strips every character that is
//! illegal in a Firestore document ID (`/`, `?`, `#`, ...) while keeping a
//! practically 1:1 mapping from URL to key, so re-ingesting the same URL
//! always lands on the same document.

use sha2::{Digest, Sha256};

use crate::error::{Result, StoreError};

/// Prefix that scopes news keys within a shared collection.
pub const DOCUMENT_KEY_PREFIX: &str = "news_";

/// Length of a derived key: prefix plus 64 hex characters.
pub const DOCUMENT_KEY_LEN: usize = DOCUMENT_KEY_PREFIX.len() + 64;

/// Derive the document key for `url`.
///
/// # Errors
///
/// Returns [`StoreError::InvalidInput`] when `url` is empty or only
/// whitespace.
pub fn document_key(url: &str) -> Result<String> {
    if url.trim().is_empty() {
        return Err(StoreError::InvalidInput("url must not be empty".into()));
    }
    Ok(format!("{}{}", DOCUMENT_KEY_PREFIX, sha256_hex(url.as_bytes())))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Check that `key` is usable as a Firestore document ID.
///
/// Firestore rejects IDs containing `/`, the IDs `.` and `..`, IDs
/// matching `__.*__`, and IDs longer than 1500 bytes. Derived keys are
/// additionally restricted to `[a-z0-9_]`.
pub fn is_valid_document_key(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= 1500
        && key != "."
        && key != ".."
        && !(key.len() >= 4 && key.starts_with("__") && key.ends_with("__"))
        && key
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}
