//! Document database initialization
//!
//! Tables are created idempotently on every start:
//! - `artifacts`: one row per stored file (content hash)
//! - `documents`: one row per recipient copy, several may share an artifact
//! - `recipient_status`: viewed / signed lifecycle, one row per document

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::error::Result;

/// Open (creating if needed) the document database and ensure the schema
///
/// In-memory URLs get a single, never-recycled connection so every query
/// sees the same database.
pub async fn init_database(database_url: &str) -> Result<SqlitePool> {
    let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");

    let mut options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(5000));
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?
    };

    create_artifacts_table(&pool).await?;
    create_documents_table(&pool).await?;
    create_recipient_status_table(&pool).await?;

    info!("Document database ready: {}", database_url);
    Ok(pool)
}

async fn create_artifacts_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artifacts (
            hash TEXT PRIMARY KEY,
            file_size INTEGER NOT NULL CHECK (file_size >= 0),
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_documents_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            guid TEXT PRIMARY KEY,
            owner_user_id INTEGER,
            artifact_hash TEXT NOT NULL REFERENCES artifacts(hash),
            batch_id TEXT,
            file_name TEXT NOT NULL,
            original_name TEXT NOT NULL,
            file_size INTEGER NOT NULL CHECK (file_size >= 0),
            document_type TEXT NOT NULL
                CHECK (document_type IN ('dni', 'payroll', 'contract', 'proof', 'other')),
            requires_signature INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_batch ON documents(batch_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_artifact ON documents(artifact_hash)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_recipient_status_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recipient_status (
            document_guid TEXT NOT NULL REFERENCES documents(guid) ON DELETE CASCADE,
            user_id INTEGER NOT NULL,
            is_viewed INTEGER NOT NULL DEFAULT 0,
            viewed_at TEXT,
            is_accepted INTEGER NOT NULL DEFAULT 0,
            accepted_at TEXT,
            digital_signature TEXT,
            PRIMARY KEY (document_guid, user_id),
            CHECK (is_accepted = 0 OR is_viewed = 1)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_recipient_status_user ON recipient_status(user_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
