//! Chunk and file inspection.
//!
//! Backs `memidx get`, `memidx show` and `memidx files`.

use anyhow::{bail, Result};
use serde::Serialize;

use memory_indexer_core::models::{Chunk, DocumentClass, IndexedFile};
use memory_indexer_core::store::Store;

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

/// Chunk response for `memidx get --json`.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkResponse {
    pub chunk_id: String,
    pub source_path: String,
    pub document_class: DocumentClass,
    pub ordinal: i64,
    pub approx_token_count: i64,
    pub created_at: String, // ISO8601
    pub embedding_dims: usize,
    pub text: String,
}

impl From<&Chunk> for ChunkResponse {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            source_path: chunk.source_path.clone(),
            document_class: chunk.document_class,
            ordinal: chunk.ordinal,
            approx_token_count: chunk.approx_token_count,
            created_at: format_ts_iso(chunk.created_at),
            embedding_dims: chunk.embedding.len(),
            text: chunk.text.clone(),
        }
    }
}

/// Look up one chunk by id.
pub async fn get_chunk(store: &dyn Store, id: &str) -> Result<ChunkResponse> {
    match store.get_chunk(id).await? {
        Some(chunk) => Ok(ChunkResponse::from(&chunk)),
        None => bail!("chunk not found: {}", id),
    }
}

/// Look up a tracked file and its chunks in ordinal order.
pub async fn get_file(store: &dyn Store, path: &str) -> Result<(IndexedFile, Vec<Chunk>)> {
    let file = match store.get_indexed_file(path).await? {
        Some(f) => f,
        None => bail!("file not indexed: {}", path),
    };
    let chunks = store.chunks_for_file(path).await?;
    Ok((file, chunks))
}

/// `memidx get`.
pub async fn run_get(config: &Config, id: &str, json: bool) -> Result<()> {
    let database = db::open(config).await?;
    let store = SqliteStore::new(&database);
    let chunk = get_chunk(&store, id).await;
    database.close().await;
    let chunk = chunk?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chunk)?);
        return Ok(());
    }

    println!("--- Chunk ---");
    println!("id:           {}", chunk.chunk_id);
    println!("source_path:  {}", chunk.source_path);
    println!("class:        {}", chunk.document_class);
    println!("ordinal:      {}", chunk.ordinal);
    println!("words:        {}", chunk.approx_token_count);
    println!("created_at:   {}", chunk.created_at);
    println!("embedding:    {} dims", chunk.embedding_dims);
    println!();
    println!("{}", chunk.text);
    Ok(())
}

/// `memidx show`: a file's tracking row and its chunks.
pub async fn run_show(config: &Config, path: &str) -> Result<()> {
    // Tracked paths are canonical; accept relative input too.
    let key = std::path::Path::new(path)
        .canonicalize()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| path.to_string());

    let database = db::open(config).await?;
    let store = SqliteStore::new(&database);
    let found = get_file(&store, &key).await;
    database.close().await;
    let (file, chunks) = found?;

    println!("--- File ---");
    println!("path:         {}", file.path);
    println!("class:        {}", DocumentClass::from_path(&file.path));
    println!("digest:       {}", file.content_digest);
    println!("chunks:       {}", file.chunk_count);
    println!("indexed_at:   {}", format_ts_iso(file.last_indexed_at));

    for chunk in &chunks {
        println!();
        println!(
            "--- Chunk {} ({} words) id={} ---",
            chunk.ordinal, chunk.approx_token_count, chunk.chunk_id
        );
        println!("{}", chunk.text);
    }
    Ok(())
}

/// `memidx files`: every tracked file.
pub async fn run_files(config: &Config) -> Result<()> {
    let database = db::open(config).await?;
    let store = SqliteStore::new(&database);
    let files = store.list_indexed_files().await;
    database.close().await;
    let files = files?;

    if files.is_empty() {
        println!("No files indexed.");
        return Ok(());
    }

    println!("{:>6}  {:<20}  {:<8}  PATH", "CHUNKS", "INDEXED", "CLASS");
    for file in &files {
        println!(
            "{:>6}  {:<20}  {:<8}  {}",
            file.chunk_count,
            format_ts_iso(file.last_indexed_at),
            DocumentClass::from_path(&file.path),
            file.path
        );
    }
    Ok(())
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}
