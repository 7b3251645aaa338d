use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create the schema on an open pool. Safe to run repeatedly.
pub async fn migrate(pool: &SqlitePool) -> Result<()> {
    // One row per tracked source file
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS indexed_files (
            path TEXT PRIMARY KEY,
            content_digest TEXT NOT NULL,
            chunk_count INTEGER NOT NULL,
            last_indexed_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Chunks carry their embedding; the two are written together
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            document_class TEXT NOT NULL,
            text TEXT NOT NULL,
            ordinal INTEGER NOT NULL,
            approx_token_count INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            UNIQUE(source_path, ordinal)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // FTS5 CREATE is not idempotent natively, so we check first
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='chunks_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE chunks_fts USING fts5(
                chunk_id UNINDEXED,
                source_path UNINDEXED,
                text,
                tokenize = 'unicode61 remove_diacritics 0'
            )
            "#,
        )
        .execute(pool)
        .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source_path ON chunks(source_path)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_created_at ON chunks(created_at DESC)")
        .execute(pool)
        .await?;

    Ok(())
}

/// `memidx init`: create the database file and schema.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let db = db::connect(config).await?;
    migrate(&db.pool).await?;
    tracing::info!(path = %config.db.path.display(), backend = %db.vector, "schema ready");
    db.close().await;
    Ok(())
}
