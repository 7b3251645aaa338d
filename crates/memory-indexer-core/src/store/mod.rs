//! Storage abstraction for the memory indexer.
//!
//! The [`Store`] trait defines every storage operation the indexing pipeline
//! and the ranker need, so the same logic runs against SQLite in the app and
//! against [`memory::InMemoryStore`] in tests.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Chunk, DocumentClass, IndexedFile};

/// Meta key recording the embedding model the corpus was built with.
pub const META_EMBEDDING_MODEL: &str = "embedding_model";
/// Meta key recording the embedding dimensionality.
pub const META_EMBEDDING_DIMS: &str = "embedding_dims";

/// A candidate chunk returned from keyword or vector search.
///
/// Carries enough to build a [`SearchResult`](crate::models::SearchResult)
/// without another round-trip.
#[derive(Debug, Clone)]
pub struct ChunkCandidate {
    pub chunk_id: String,
    pub source_path: String,
    pub document_class: DocumentClass,
    pub text: String,
    pub ordinal: i64,
    /// BM25 statistic (higher is better) or cosine similarity.
    pub raw_score: f64,
}

impl ChunkCandidate {
    pub fn from_chunk(chunk: &Chunk, raw_score: f64) -> Self {
        Self {
            chunk_id: chunk.chunk_id.clone(),
            source_path: chunk.source_path.clone(),
            document_class: chunk.document_class,
            text: chunk.text.clone(),
            ordinal: chunk.ordinal,
            raw_score,
        }
    }
}

/// Abstract storage backend.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`get_indexed_file`](Store::get_indexed_file) | Tracking row for a path |
/// | [`replace_file`](Store::replace_file) | Swap a file's chunk set and digest atomically |
/// | [`remove_file`](Store::remove_file) | Drop a file's chunks and tracking row |
/// | [`get_chunk`](Store::get_chunk) | One chunk by id |
/// | [`chunks_for_file`](Store::chunks_for_file) | A file's chunks in ordinal order |
/// | [`list_indexed_files`](Store::list_indexed_files) | All tracking rows |
/// | [`keyword_search`](Store::keyword_search) | BM25 full-text search |
/// | [`vector_search`](Store::vector_search) | Cosine similarity search |
/// | [`recent_chunks`](Store::recent_chunks) | Time-range scan over `created_at` |
#[async_trait]
pub trait Store: Send + Sync {
    async fn get_indexed_file(&self, path: &str) -> Result<Option<IndexedFile>>;

    /// Replace every chunk of `file.path` with `chunks` and upsert the
    /// tracking row, all in one unit of work. On error nothing changes.
    async fn replace_file(&self, file: &IndexedFile, chunks: &[Chunk]) -> Result<()>;

    /// Remove a file's chunks and tracking row. Returns false if untracked.
    async fn remove_file(&self, path: &str) -> Result<bool>;

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>>;

    async fn chunks_for_file(&self, path: &str) -> Result<Vec<Chunk>>;

    /// All tracking rows, ordered by path.
    async fn list_indexed_files(&self) -> Result<Vec<IndexedFile>>;

    /// Up to `limit` chunks matching any query token, best first.
    async fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<ChunkCandidate>>;

    /// Up to `limit` chunks nearest to `query_vec`, most similar first.
    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ChunkCandidate>>;

    /// Chunks with `since <= created_at <= until`, newest first, then by
    /// path and ordinal.
    async fn recent_chunks(&self, since: i64, until: i64) -> Result<Vec<Chunk>>;

    async fn get_meta(&self, key: &str) -> Result<Option<String>>;

    async fn set_meta(&self, key: &str, value: &str) -> Result<()>;
}

/// Outcome of comparing a provider against the model the corpus was built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelPin {
    /// No model recorded yet.
    Unpinned,
    /// The recorded model and dims match.
    Matches,
    /// The corpus was built with a different model or dimensionality.
    Mismatch { model: String, dims: usize },
}

/// Compare `model`/`dims` against the pin stored in `store`.
pub async fn check_model_pin(store: &dyn Store, model: &str, dims: usize) -> Result<ModelPin> {
    let pinned_model = store.get_meta(META_EMBEDDING_MODEL).await?;
    let pinned_dims = store.get_meta(META_EMBEDDING_DIMS).await?;

    match (pinned_model, pinned_dims) {
        (Some(m), Some(d)) => {
            let d: usize = d.parse().unwrap_or(0);
            if m == model && d == dims {
                Ok(ModelPin::Matches)
            } else {
                Ok(ModelPin::Mismatch { model: m, dims: d })
            }
        }
        _ => Ok(ModelPin::Unpinned),
    }
}

/// Record `model`/`dims` as the corpus embedding model.
pub async fn pin_model(store: &dyn Store, model: &str, dims: usize) -> Result<()> {
    store.set_meta(META_EMBEDDING_MODEL, model).await?;
    store.set_meta(META_EMBEDDING_DIMS, &dims.to_string()).await?;
    Ok(())
}
