//! Schema for the SQLite backend.
//!
//! One table holds every collection. Fields are stored as a JSON object of
//! tagged [`FieldValue`](crate::store::FieldValue)s so the schema does not
//! change when record fields do. Running the migration twice is safe.

use sqlx::SqlitePool;

use crate::error::Result;

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            collection TEXT NOT NULL,
            key TEXT NOT NULL,
            fields_json TEXT NOT NULL,
            written_at INTEGER NOT NULL,
            PRIMARY KEY (collection, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection)")
        .execute(pool)
        .await?;

    Ok(())
}
