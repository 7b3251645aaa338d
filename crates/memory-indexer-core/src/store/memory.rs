//! In-memory [`Store`] implementation for tests and embedding hosts.
//!
//! All state lives behind one `std::sync::RwLock`, so a file's chunk swap is
//! atomic with respect to readers. Keyword search is Okapi BM25 over the
//! stored chunk texts; vector search is brute-force cosine similarity.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::lexical::{query_terms, tokenize, Bm25};
use crate::models::{Chunk, IndexedFile};

use super::{ChunkCandidate, Store};

#[derive(Default)]
struct Inner {
    files: HashMap<String, IndexedFile>,
    /// Insertion order doubles as the tie-break for equal scores.
    chunks: Vec<Chunk>,
    meta: HashMap<String, String>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

fn sort_candidates(candidates: &mut Vec<(usize, ChunkCandidate)>, limit: usize) {
    candidates.sort_by(|a, b| {
        b.1.raw_score
            .partial_cmp(&a.1.raw_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    candidates.truncate(limit);
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_indexed_file(&self, path: &str) -> Result<Option<IndexedFile>> {
        Ok(self.read()?.files.get(path).cloned())
    }

    async fn replace_file(&self, file: &IndexedFile, chunks: &[Chunk]) -> Result<()> {
        let mut inner = self.write()?;
        inner.chunks.retain(|c| c.source_path != file.path);
        inner.chunks.extend(chunks.iter().cloned());
        inner.files.insert(file.path.clone(), file.clone());
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<bool> {
        let mut inner = self.write()?;
        inner.chunks.retain(|c| c.source_path != path);
        Ok(inner.files.remove(path).is_some())
    }

    async fn get_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        Ok(self
            .read()?
            .chunks
            .iter()
            .find(|c| c.chunk_id == chunk_id)
            .cloned())
    }

    async fn chunks_for_file(&self, path: &str) -> Result<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self
            .read()?
            .chunks
            .iter()
            .filter(|c| c.source_path == path)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.ordinal);
        Ok(chunks)
    }

    async fn list_indexed_files(&self) -> Result<Vec<IndexedFile>> {
        let mut files: Vec<IndexedFile> = self.read()?.files.values().cloned().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    async fn keyword_search(&self, query: &str, limit: usize) -> Result<Vec<ChunkCandidate>> {
        let terms = query_terms(query);
        if terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let inner = self.read()?;
        let docs: Vec<Vec<String>> = inner.chunks.iter().map(|c| tokenize(&c.text)).collect();
        let bm25 = Bm25::new(&docs);

        let mut candidates: Vec<(usize, ChunkCandidate)> = inner
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(i, c)| {
                let score = bm25.score(i, &terms);
                (score > 0.0).then(|| (i, ChunkCandidate::from_chunk(c, score)))
            })
            .collect();

        sort_candidates(&mut candidates, limit);
        Ok(candidates.into_iter().map(|(_, c)| c).collect())
    }

    async fn vector_search(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ChunkCandidate>> {
        if query_vec.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let inner = self.read()?;
        let mut candidates: Vec<(usize, ChunkCandidate)> = inner
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let sim = cosine_similarity(query_vec, &c.embedding) as f64;
                (i, ChunkCandidate::from_chunk(c, sim))
            })
            .collect();

        sort_candidates(&mut candidates, limit);
        Ok(candidates.into_iter().map(|(_, c)| c).collect())
    }

    async fn recent_chunks(&self, since: i64, until: i64) -> Result<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self
            .read()?
            .chunks
            .iter()
            .filter(|c| c.created_at >= since && c.created_at <= until)
            .cloned()
            .collect();
        chunks.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.source_path.cmp(&b.source_path))
                .then(a.ordinal.cmp(&b.ordinal))
        });
        Ok(chunks)
    }

    async fn get_meta(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read()?.meta.get(key).cloned())
    }

    async fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.write()?.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }
}
