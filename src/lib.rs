//! # News Store
//!
//! Idempotent, URL-keyed storage of news items in a document database.
//!
//! Every news item is addressed by `news_` + hex(SHA-256(url)), so storing
//! the same URL twice updates one document instead of creating a
//! duplicate, and URLs full of `/`, `?` and `#` still produce keys that are
//! legal document IDs.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌─────────────┐   ┌──────────────────────┐
//! │ NewsItem  │──▶│  NewsStore  │──▶│    DocumentStore     │
//! │ (upstream)│   │ key + upsert│   │ Firestore/SQLite/mem │
//! └───────────┘   └──────┬──────┘   └──────────────────────┘
//!                        │
//!                 ┌──────┴──────┐
//!                 ▼             ▼
//!            ┌─────────┐  ┌──────────┐
//!            │   CLI   │  │  digest  │
//!            │(newsctl)│  │(markdown)│
//!            └─────────┘  └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! newsctl put --title "Launch" --url "https://ex.com/a?x=1#y" --date 2024-01-01
//! newsctl get "https://ex.com/a?x=1#y"
//! newsctl list --limit 20
//! newsctl digest --output news.md
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`key`] | Document key derivation |
//! | [`news`] | The keyed upsert store |
//! | [`models`] | News item and stored record types |
//! | [`store`] | Document database trait and backends |
//! | [`credentials`] | Firestore credential providers |
//! | [`config`] | TOML configuration and environment overrides |
//! | [`error`] | Typed errors |
//! | [`digest`] | Markdown digest rendering |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | SQLite schema |

pub mod config;
pub mod credentials;
pub mod db;
pub mod digest;
pub mod error;
pub mod get;
pub mod key;
pub mod list;
pub mod migrate;
pub mod models;
pub mod news;
pub mod put;
pub mod store;

pub use error::{ErrorKind, StoreError};
pub use models::{NewsItem, StoredRecord};
pub use news::NewsStore;
