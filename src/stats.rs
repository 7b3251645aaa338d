//! Index statistics.
//!
//! Summarizes what's indexed: tracked files, chunks, a per-class breakdown,
//! the active vector backend and the pinned embedding model. Used by
//! `memidx stats`.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use memory_indexer_core::store::{META_EMBEDDING_DIMS, META_EMBEDDING_MODEL};

use crate::config::Config;
use crate::db;

/// Per-class breakdown of file and chunk counts.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassStats {
    pub class: String,
    pub file_count: i64,
    pub chunk_count: i64,
    pub last_indexed_ts: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct IndexStats {
    pub total_files: i64,
    pub total_chunks: i64,
    pub by_class: Vec<ClassStats>,
    pub pinned_model: Option<String>,
    pub pinned_dims: Option<String>,
}

pub async fn collect_stats(pool: &SqlitePool) -> Result<IndexStats> {
    let total_files: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM indexed_files")
        .fetch_one(pool)
        .await?;

    let total_chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
        .fetch_one(pool)
        .await?;

    let class_rows = sqlx::query(
        r#"
        SELECT
            document_class,
            COUNT(DISTINCT source_path) AS file_count,
            COUNT(*) AS chunk_count,
            MAX(created_at) AS last_indexed
        FROM chunks
        GROUP BY document_class
        ORDER BY chunk_count DESC, document_class ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let by_class = class_rows
        .iter()
        .map(|row| ClassStats {
            class: row.get("document_class"),
            file_count: row.get("file_count"),
            chunk_count: row.get("chunk_count"),
            last_indexed_ts: row.get("last_indexed"),
        })
        .collect();

    let pinned_model = get_meta(pool, META_EMBEDDING_MODEL).await?;
    let pinned_dims = get_meta(pool, META_EMBEDDING_DIMS).await?;

    Ok(IndexStats {
        total_files,
        total_chunks,
        by_class,
        pinned_model,
        pinned_dims,
    })
}

async fn get_meta(pool: &SqlitePool, key: &str) -> Result<Option<String>> {
    Ok(
        sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?,
    )
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let database = db::open(config).await?;
    let stats = collect_stats(&database.pool).await;
    let backend = database.vector.to_string();
    database.close().await;
    let stats = stats?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("memidx: index stats");
    println!("===================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Vectors:     {}", backend);
    match (&stats.pinned_model, &stats.pinned_dims) {
        (Some(model), Some(dims)) => println!("  Model:       {} ({} dims)", model, dims),
        _ => println!("  Model:       (not pinned)"),
    }
    println!();
    println!("  Files:       {}", stats.total_files);
    println!("  Chunks:      {}", stats.total_chunks);

    if !stats.by_class.is_empty() {
        println!();
        println!("  By class:");
        println!(
            "  {:<12} {:>6} {:>8}   {}",
            "CLASS", "FILES", "CHUNKS", "LAST INDEXED"
        );
        println!("  {}", "-".repeat(48));

        for s in &stats.by_class {
            let last = match s.last_indexed_ts {
                Some(ts) => format_ts_relative(ts),
                None => "never".to_string(),
            };
            println!(
                "  {:<12} {:>6} {:>8}   {}",
                s.class, s.file_count, s.chunk_count, last
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp relative to now (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    format_ts_relative_to(ts, chrono::Utc::now().timestamp())
}

fn format_ts_relative_to(ts: i64, now: i64) -> String {
    let delta = now - ts;

    if delta < 0 {
        return format_ts_date(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_date(ts)
    }
}

fn format_ts_date(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
