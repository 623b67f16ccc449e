//! SQLite connection management.
//!
//! Opens a pooled connection to the local news database with WAL mode
//! enabled, so the CLI can read while an import is writing. The database
//! file and its parent directories are created if they don't exist.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;

use crate::error::{Result, StoreError};

/// Create a connection pool to the SQLite database at `path`.
///
/// # Errors
///
/// Returns [`StoreError::StoreUnavailable`] if the file cannot be created
/// or opened.
pub async fn connect(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::StoreUnavailable(format!(
                    "cannot create directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
